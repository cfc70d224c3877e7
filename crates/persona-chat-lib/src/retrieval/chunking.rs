//! Corpus splitting: the whole corpus arrives as one document and is cut into
//! paragraph-sized passages before embedding.

/// Split `text` into passages of at most `max_chars` characters.
///
/// Paragraphs (separated by blank lines) are kept whole when they fit.
/// Longer paragraphs are split into sentences which are packed greedily; a
/// single sentence longer than `max_chars` is split on word boundaries.
/// Whitespace inside a passage is collapsed to single spaces.
pub fn split_passages(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    for paragraph in paragraphs(text) {
        if paragraph.chars().count() <= max_chars {
            out.push(paragraph);
            continue;
        }
        let mut packer = Packer::new(max_chars);
        for sentence in sentences(&paragraph) {
            for piece in hard_wrap(&sentence, max_chars) {
                let len = piece.chars().count();
                packer.push(&piece, len, &mut out);
            }
        }
        packer.flush(&mut out);
    }
    out
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            push_paragraph(&mut out, &lines);
            lines.clear();
        } else {
            lines.push(line);
        }
    }
    push_paragraph(&mut out, &lines);
    out
}

fn push_paragraph(out: &mut Vec<String>, lines: &[&str]) {
    let collapsed = lines
        .iter()
        .flat_map(|l| l.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if !collapsed.is_empty() {
        out.push(collapsed);
    }
}

fn sentences(paragraph: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = paragraph.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?');
        let at_break = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
        if terminal && at_break {
            let s = current.trim().to_string();
            if !s.is_empty() {
                out.push(s);
            }
            current.clear();
        }
    }
    let s = current.trim().to_string();
    if !s.is_empty() {
        out.push(s);
    }
    out
}

fn hard_wrap(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }
    let mut out = Vec::new();
    let mut packer = Packer::new(max_chars);
    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            packer.flush(&mut out);
            let chars: Vec<char> = word.chars().collect();
            for slice in chars.chunks(max_chars) {
                out.push(slice.iter().collect());
            }
            continue;
        }
        packer.push(word, word_len, &mut out);
    }
    packer.flush(&mut out);
    out
}

/// Greedy space-joined packing; `len` is the buffer's length in chars.
struct Packer {
    current: String,
    len: usize,
    max_chars: usize,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Packer {
            current: String::new(),
            len: 0,
            max_chars,
        }
    }

    /// `piece_len` is `piece.chars().count()`.
    fn push(&mut self, piece: &str, piece_len: usize, out: &mut Vec<String>) {
        if self.len > 0 && self.len + 1 + piece_len > self.max_chars {
            self.flush(out);
        }
        if self.len > 0 {
            self.current.push(' ');
            self.len += 1;
        }
        self.current.push_str(piece);
        self.len += piece_len;
    }

    fn flush(&mut self, out: &mut Vec<String>) {
        if !self.current.is_empty() {
            out.push(std::mem::take(&mut self.current));
        }
        self.len = 0;
    }
}
