//! Crossterm cell-buffer backend for the drawing surface.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{poll, read, Event, KeyCode, KeyModifiers},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        disable_raw_mode, enable_raw_mode, size, window_size, Clear, ClearType,
        EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, stdout, Write};
use std::time::Duration;

use crate::surface::{normalize_rect, Rgb, Surface};

/// Estimated device pixels per cell when the terminal does not report a
/// window pixel size; used only by the wide-viewport predicate.
const FALLBACK_CELL_PX: f32 = 8.0;

/// A single cell in the terminal buffer.
#[derive(Clone)]
struct Cell {
    ch: char,
    fg: Option<Color>,
}

impl Default for Cell {
    fn default() -> Self {
        Self { ch: ' ', fg: None }
    }
}

/// Double-buffered terminal renderer. One cell is one surface unit.
pub struct Terminal {
    width: u16,
    height: u16,
    buffer: Vec<Vec<Cell>>,
    alternate_screen: bool,
}

impl Terminal {
    /// Initialize the terminal for drawing.
    pub fn new(alternate_screen: bool) -> io::Result<Self> {
        let (width, height) = size()?;

        if alternate_screen {
            enable_raw_mode()?;
            execute!(stdout(), EnterAlternateScreen, Hide)?;
        }

        let buffer = vec![vec![Cell::default(); width as usize]; height as usize];

        Ok(Self {
            width,
            height,
            buffer,
            alternate_screen,
        })
    }

    /// Terminal dimensions in cells.
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Reallocate the buffer for a new terminal size.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.buffer = vec![vec![Cell::default(); width as usize]; height as usize];
    }

    /// Sync the buffer to the current terminal size if it changed.
    /// Returns true when a resize happened.
    pub fn sync_size(&mut self) -> io::Result<bool> {
        let (width, height) = size()?;
        if width != self.width || height != self.height {
            self.resize(width, height);
            self.clear_screen()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Clear the actual terminal.
    pub fn clear_screen(&self) -> io::Result<()> {
        execute!(stdout(), Clear(ClearType::All))?;
        Ok(())
    }

    /// Set a character at a cell position with an optional color.
    pub fn set(&mut self, x: i32, y: i32, ch: char, fg: Option<Color>) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize][x as usize] = Cell { ch, fg };
        }
    }

    /// Set a string starting at a cell position.
    pub fn set_str(&mut self, x: i32, y: i32, s: &str, fg: Option<Color>) {
        for (i, ch) in s.chars().enumerate() {
            self.set(x + i as i32, y, ch, fg);
        }
    }

    /// Render the entire buffer to the screen.
    pub fn present(&self) -> io::Result<()> {
        let mut stdout = stdout();
        for (y, row) in self.buffer.iter().enumerate() {
            execute!(stdout, MoveTo(0, y as u16))?;
            for cell in row {
                if let Some(color) = cell.fg {
                    execute!(stdout, SetForegroundColor(color), Print(cell.ch), ResetColor)?;
                } else {
                    execute!(stdout, Print(cell.ch))?;
                }
            }
        }
        stdout.flush()?;
        Ok(())
    }

    /// Check for a keypress (non-blocking).
    pub fn check_key(&self) -> io::Result<Option<(KeyCode, KeyModifiers)>> {
        if poll(Duration::from_millis(0))? {
            if let Event::Key(key_event) = read()? {
                return Ok(Some((key_event.code, key_event.modifiers)));
            }
        }
        Ok(None)
    }

    /// Sleep for the given duration in seconds.
    pub fn sleep(&self, seconds: f32) {
        std::thread::sleep(Duration::from_secs_f32(seconds));
    }

    /// Viewport width in device pixels, estimated when the terminal does not
    /// report one.
    fn pixel_width(&self) -> f32 {
        match window_size() {
            Ok(ws) if ws.width > 0 => ws.width as f32,
            _ => self.width as f32 * FALLBACK_CELL_PX,
        }
    }
}

impl Surface for Terminal {
    fn width(&self) -> f32 {
        self.width as f32
    }

    fn height(&self) -> f32 {
        self.height as f32
    }

    fn clear(&mut self, _color: Rgb) {
        for row in &mut self.buffer {
            for cell in row {
                *cell = Cell::default();
            }
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb) {
        let (x, y, w, h) = normalize_rect(x, y, w, h);
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let x0 = x.round() as i32;
        let y0 = y.round() as i32;
        // A rectangle thinner than one cell still paints one cell.
        let cols = (w.round() as i32).max(1);
        let rows = (h.round() as i32).max(1);
        let fg = Some(Color::Rgb {
            r: color.r,
            g: color.g,
            b: color.b,
        });
        for row in y0..y0 + rows {
            for col in x0..x0 + cols {
                self.set(col, row, '█', fg);
            }
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgb) {
        let fg = Some(Color::Rgb {
            r: color.r,
            g: color.g,
            b: color.b,
        });
        self.set_str(x.round() as i32, y.round() as i32, text, fg);
    }

    fn is_wide_viewport(&self, threshold_px: f32) -> bool {
        self.pixel_width() >= threshold_px
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.alternate_screen {
            let _ = execute!(stdout(), Show, LeaveAlternateScreen);
            let _ = disable_raw_mode();
        }
    }
}
