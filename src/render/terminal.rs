use anyhow::Result;
use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use std::io::{stdout, BufWriter, Stdout, Write};

use super::curve::DrawCommand;
use super::raster::{column_tops, Rgb};

/// Vertical resolution of one terminal cell.
pub const CELL_STEPS: u16 = 8;

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Renders a command drawn on a `cols` x `rows * CELL_STEPS` surface as rows
/// of eighth-block glyphs, top row first.
pub fn block_rows(cmd: &DrawCommand, cols: u16, rows: u16) -> Vec<String> {
    let steps = CELL_STEPS as f32;
    let full = rows as f32 * steps;
    let scale = if cmd.height > 0.0 { full / cmd.height } else { 0.0 };

    let filled: Vec<f32> = column_tops(cmd, cols as usize)
        .into_iter()
        .map(|top| ((cmd.height - top) * scale).clamp(0.0, full))
        .collect();

    (0..rows)
        .map(|row| {
            let floor = (rows - 1 - row) as f32 * steps;
            filled
                .iter()
                .map(|&height| {
                    let level = (height - floor).clamp(0.0, steps).round() as usize;
                    LEVELS[level]
                })
                .collect()
        })
        .collect()
}

/// Alternate-screen view used by live playback. Restores the terminal on drop.
pub struct TerminalSurface {
    out: BufWriter<Stdout>,
    color: Color,
}

impl TerminalSurface {
    pub fn enter(fill: Rgb) -> Result<Self> {
        let mut out = BufWriter::with_capacity(256 * 1024, stdout());
        terminal::enable_raw_mode()?;
        execute!(
            out,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(ClearType::All),
        )?;

        Ok(Self {
            out,
            color: Color::Rgb {
                r: fill[0],
                g: fill[1],
                b: fill[2],
            },
        })
    }

    /// Drawable area in cells; the top row is kept for the status line.
    pub fn area(&self) -> Result<(u16, u16)> {
        let (cols, rows) = terminal::size()?;
        Ok((cols, rows.saturating_sub(1)))
    }

    pub fn draw(&mut self, cmd: &DrawCommand, status: &str) -> Result<()> {
        let (cols, rows) = self.area()?;

        queue!(
            self.out,
            cursor::MoveTo(0, 0),
            ResetColor,
            terminal::Clear(ClearType::CurrentLine),
            Print(status),
            SetForegroundColor(self.color),
        )?;

        for (i, line) in block_rows(cmd, cols, rows).iter().enumerate() {
            queue!(self.out, cursor::MoveTo(0, i as u16 + 1), Print(line))?;
        }

        queue!(self.out, ResetColor)?;
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        let _ = execute!(self.out, ResetColor, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}
