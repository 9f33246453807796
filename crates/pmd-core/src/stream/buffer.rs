use std::collections::VecDeque;

/// Keeps the last `cap` lines of an output stream.
#[derive(Debug)]
pub struct RingBuffer {
    cap: usize,
    lines: VecDeque<String>,
}

impl RingBuffer {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            lines: VecDeque::with_capacity(cap.min(64)),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Joins the kept lines, each terminated by a newline.
    pub fn contents(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_tail() {
        let mut buf = RingBuffer::new(2);
        for line in ["a", "b", "c"] {
            buf.push(line);
        }
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.contents(), "b\nc\n");
    }

    #[test]
    fn empty_contents() {
        assert!(RingBuffer::new(10).contents().is_empty());
    }
}
