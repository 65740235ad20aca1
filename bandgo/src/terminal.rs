use crossterm::cursor::{Hide, MoveToPreviousLine, Show};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, Stdout, Write};

/// The bottom block of the terminal, rewritten in place on every redraw.
///
/// Lines printed with [`LiveRegion::println`] stay above it and scroll
/// normally. Dropping the region shows the cursor again.
pub struct LiveRegion<W: Write> {
    out: W,
    lines: u16,
    cursor_hidden: bool,
}

impl LiveRegion<Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LiveRegion<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            lines: 0,
            cursor_hidden: false,
        }
    }

    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Writes a line above the region. Only meaningful before the first redraw.
    pub fn println(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    /// Replaces whatever the previous redraw left on screen with `frame`.
    pub fn redraw(&mut self, frame: &str) -> io::Result<()> {
        if self.lines > 0 {
            queue!(self.out, MoveToPreviousLine(self.lines))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        if !self.cursor_hidden {
            queue!(self.out, Hide)?;
            self.cursor_hidden = true;
        }
        self.out.write_all(frame.as_bytes())?;
        if !frame.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        self.lines = u16::try_from(frame.lines().count()).unwrap_or(u16::MAX);
        self.out.flush()
    }

    /// Leaves the last frame on screen and returns to normal scrolling output.
    pub fn reset(&mut self) -> io::Result<()> {
        self.lines = 0;
        if self.cursor_hidden {
            queue!(self.out, Show)?;
            self.cursor_hidden = false;
        }
        self.out.flush()
    }
}

impl<W: Write> Drop for LiveRegion<W> {
    fn drop(&mut self) {
        // no-op when the owner already reset
        let _ = self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(region: &LiveRegion<Vec<u8>>) -> String {
        String::from_utf8_lossy(region.get_ref()).into_owned()
    }

    #[test]
    fn first_redraw_does_not_move_up() {
        let mut region = LiveRegion::new(Vec::new());
        region.println("Traffic Monitor").unwrap();
        region.redraw("a\nb\n").unwrap();
        let out = output(&region);
        assert!(out.starts_with("Traffic Monitor\n"));
        assert!(!out.contains('F'));
        assert!(out.ends_with("a\nb\n"));
    }

    #[test]
    fn redraw_rewinds_previous_frame() {
        let mut region = LiveRegion::new(Vec::new());
        region.redraw("one\ntwo\nthree\n").unwrap();
        let before = region.get_ref().len();
        region.redraw("four").unwrap();
        let out = output(&region);
        let second = &out[before..];
        assert!(second.starts_with("\x1b[3F"));
        assert!(second.ends_with("four\n"));
        region.redraw("five\n").unwrap();
        assert!(output(&region).contains("\x1b[1F"));
    }

    #[test]
    fn reset_shows_cursor_once() {
        let mut region = LiveRegion::new(Vec::new());
        region.redraw("frame\n").unwrap();
        region.reset().unwrap();
        region.reset().unwrap();
        assert_eq!(1, output(&region).matches("\x1b[?25h").count());
        assert_eq!(1, output(&region).matches("\x1b[?25l").count());
    }

    #[test]
    fn drop_after_reset_writes_nothing() {
        let mut out = Vec::new();
        {
            let mut region = LiveRegion::new(&mut out);
            region.redraw("frame\n").unwrap();
            region.reset().unwrap();
        }
        let text = String::from_utf8_lossy(&out);
        assert_eq!(1, text.matches("\x1b[?25h").count());
        assert!(text.ends_with("\x1b[?25h"));
    }
}
