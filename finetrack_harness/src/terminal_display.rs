//! Terminal front end: a coarse character rendering of each frame plus
//! non-blocking keyboard input.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEventKind},
    execute, queue,
    style::Print,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use finetrack::display::{DisplayAnnotations, DisplayInterface, Key};
use ndarray::ArrayView2;
use std::io::{self, Stdout, Write};
use std::time::Duration;

/// Brightness ramp from dark to bright
const SHADES: &[u8] = b" .:-=+*#%@";

/// Render `frame` into `rows` lines of `cols` characters.
///
/// Each character shows the brightest pixel of its cell, scaled to the frame
/// maximum. The setpoint is drawn as `x`, the spot as `O` and the region
/// outline with `|` and `-`.
pub fn render_thumbnail(
    frame: ArrayView2<u16>,
    annotations: &DisplayAnnotations,
    cols: usize,
    rows: usize,
) -> Vec<String> {
    let (height, width) = frame.dim();
    if height == 0 || width == 0 || cols == 0 || rows == 0 {
        return Vec::new();
    }
    let cols = cols.min(width);
    let rows = rows.min(height);
    let cell_w = width as f64 / cols as f64;
    let cell_h = height as f64 / rows as f64;
    let max = frame.iter().copied().max().unwrap_or(0).max(1) as f64;

    let mut canvas: Vec<Vec<u8>> = (0..rows)
        .map(|r| {
            let y0 = (r as f64 * cell_h) as usize;
            let y1 = (((r + 1) as f64 * cell_h) as usize).clamp(y0 + 1, height);
            (0..cols)
                .map(|c| {
                    let x0 = (c as f64 * cell_w) as usize;
                    let x1 = (((c + 1) as f64 * cell_w) as usize).clamp(x0 + 1, width);
                    let peak = frame
                        .slice(ndarray::s![y0..y1, x0..x1])
                        .iter()
                        .copied()
                        .max()
                        .unwrap_or(0);
                    let level = (peak as f64 / max * (SHADES.len() - 1) as f64).round() as usize;
                    SHADES[level.min(SHADES.len() - 1)]
                })
                .collect()
        })
        .collect();

    let to_cell = |x: f64, y: f64| -> Option<(usize, usize)> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let c = (x / cell_w) as usize;
        let r = (y / cell_h) as usize;
        (c < cols && r < rows).then_some((r, c))
    };

    if let Some(region) = annotations.region_outline {
        let corners = (
            to_cell(region.x as f64, region.y as f64),
            to_cell(
                (region.x + region.width - 1) as f64,
                (region.y + region.height - 1) as f64,
            ),
        );
        if let (Some((r0, c0)), Some((r1, c1))) = corners {
            for row in canvas.iter_mut().take(r1 + 1).skip(r0) {
                row[c0] = b'|';
                row[c1] = b'|';
            }
            for c in c0..=c1 {
                canvas[r0][c] = b'-';
                canvas[r1][c] = b'-';
            }
        }
    }
    if let Some((r, c)) = annotations.setpoint.and_then(|(x, y)| to_cell(x, y)) {
        canvas[r][c] = b'x';
    }
    if let Some((r, c)) = annotations.spot.and_then(|(x, y)| to_cell(x, y)) {
        canvas[r][c] = b'O';
    }

    canvas
        .into_iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Left => Some(Key::Left),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Esc => Some(Key::Char('q')),
        _ => None,
    }
}

/// Full-screen terminal display; restores the terminal when dropped
pub struct TerminalDisplay {
    stdout: Stdout,
    cols: usize,
    rows: usize,
}

impl TerminalDisplay {
    /// Switch the terminal to raw mode on the alternate screen.
    pub fn new(cols: usize, rows: usize) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, Hide)?;
        Ok(Self { stdout, cols, rows })
    }

    fn draw(&mut self, lines: &[String], annotations: &DisplayAnnotations) -> io::Result<()> {
        queue!(self.stdout, MoveTo(0, 0), Clear(ClearType::All))?;
        for (i, line) in lines.iter().enumerate() {
            queue!(self.stdout, MoveTo(0, i as u16), Print(line))?;
        }
        let status = match annotations.spot {
            Some((x, y)) => format!("spot ({x:.2}, {y:.2})"),
            None => "spot not found".to_string(),
        };
        queue!(
            self.stdout,
            MoveTo(0, lines.len() as u16 + 1),
            Print(status),
            MoveTo(0, lines.len() as u16 + 2),
            Print("q: quit  t: toggle tracking  arrows: nudge mirror")
        )?;
        self.stdout.flush()
    }

    fn poll_key(&self) -> Option<Key> {
        if !event::poll(Duration::ZERO).unwrap_or(false) {
            return None;
        }
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => map_key(key.code),
            _ => None,
        }
    }
}

impl DisplayInterface for TerminalDisplay {
    fn render_and_poll_key(
        &mut self,
        frame: ArrayView2<u16>,
        annotations: &DisplayAnnotations,
    ) -> Option<Key> {
        let lines = render_thumbnail(frame, annotations, self.cols, self.rows);
        if let Err(e) = self.draw(&lines, annotations) {
            log::warn!("Terminal draw failed: {e}");
        }
        self.poll_key()
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}
