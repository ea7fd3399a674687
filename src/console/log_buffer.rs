use std::collections::VecDeque;

/// Bounded ring of log lines with a column cursor on the newest line.
///
/// The newest line is the one being written. When a newline would push the
/// ring past `capacity`, the oldest line is evicted. Characters past `cols`
/// are dropped until the next newline.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    cols: usize,
    col: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize, cols: usize) -> Self {
        let capacity = capacity.max(1);
        let mut lines = VecDeque::with_capacity(capacity);
        lines.push_back(String::new());
        Self { lines, capacity, cols, col: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Append text, honoring embedded newlines.
    pub fn push_str(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.new_line();
            } else if self.col < self.cols {
                let col = self.col;
                let line = self.current_mut();
                truncate_chars(line, col);
                line.push(ch);
                self.col += 1;
            }
        }
    }

    /// Drop the line being written and step back one row. The next write
    /// starts over the previous line from column zero.
    pub fn delete_line(&mut self) {
        self.lines.pop_back();
        if self.lines.is_empty() {
            self.lines.push_back(String::new());
        }
        self.col = 0;
    }

    /// All retained lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// The newest `rows` lines, oldest first.
    pub fn tail(&self, rows: usize) -> impl Iterator<Item = &str> {
        let skip = self.lines.len().saturating_sub(rows);
        self.lines.iter().skip(skip).map(String::as_str)
    }

    fn new_line(&mut self) {
        let col = self.col;
        truncate_chars(self.current_mut(), col);
        self.lines.push_back(String::new());
        self.col = 0;
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    fn current_mut(&mut self) -> &mut String {
        if self.lines.is_empty() {
            self.lines.push_back(String::new());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }
}

fn truncate_chars(line: &mut String, chars: usize) {
    if let Some((idx, _)) = line.char_indices().nth(chars) {
        line.truncate(idx);
    }
}
