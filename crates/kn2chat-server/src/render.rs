//! Screen rendering.
//!
//! Turns a [`ChatView`] into a full-screen redraw as ANSI bytes. The layout
//! is fixed:
//!
//! ```text
//! row 0        header: title and who is online
//! rows 1..h-2  transcript, newest at the bottom
//! row h-2      input line
//! row h-1      help line, or the last error
//! ```
//!
//! Everything is queued into a byte buffer; the connection task writes it in
//! one go.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{
        Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    },
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use kn2chat_core::{ChatView, Message};

/// Title shown in the header.
pub const TITLE: &str = "KN2 Chat";

const PROMPT: &str = "> ";
const HELP: &str = "enter: send | esc: quit";

/// Smallest terminal we draw into.
const MIN_COLS: u16 = 20;
const MIN_ROWS: u16 = 4;

/// Bytes that switch a terminal into the chat screen.
pub fn enter_screen() -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    queue!(out, EnterAlternateScreen, Clear(ClearType::All))?;
    Ok(out)
}

/// Bytes that restore the terminal and print a parting line.
pub fn leave_screen(farewell: &str) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    queue!(out, ResetColor, Show, LeaveAlternateScreen, Print(farewell), Print("\r\n"))?;
    Ok(out)
}

/// Full redraw of `view`. `online` is the sorted list of connected identities.
pub fn render(view: &ChatView, online: &[String]) -> io::Result<Vec<u8>> {
    let (cols, rows) = view.size();
    let (cols, rows) = (cols.max(MIN_COLS), rows.max(MIN_ROWS));
    let width = usize::from(cols);

    let mut out = Vec::with_capacity(width * usize::from(rows) + 64);
    queue!(out, Hide, ResetColor, Clear(ClearType::All))?;

    header(&mut out, online, width)?;

    let transcript_rows = usize::from(rows - 3);
    let lines = transcript_lines(view, width, transcript_rows);
    for (row, (line, system)) in lines.iter().enumerate() {
        queue!(out, MoveTo(0, (row + 1) as u16))?;
        if *system {
            queue!(out, SetForegroundColor(Color::DarkGrey), Print(line), ResetColor)?;
        } else {
            queue!(out, Print(line))?;
        }
    }

    let cursor_col = input_line(&mut out, view, width, rows - 2)?;
    status_line(&mut out, view, width, rows - 1)?;

    queue!(out, MoveTo(cursor_col, rows - 2), Show)?;
    out.flush()?;
    Ok(out)
}

fn header(out: &mut impl Write, online: &[String], width: usize) -> io::Result<()> {
    let text = format!(" {TITLE} | {} online: {}", online.len(), online.join(", "));
    queue!(
        out,
        MoveTo(0, 0),
        SetAttribute(Attribute::Bold),
        SetBackgroundColor(Color::DarkBlue),
        SetForegroundColor(Color::White),
        Print(pad(&text, width)),
        SetAttribute(Attribute::Reset),
        ResetColor
    )
}

/// Returns the terminal column of the cursor.
fn input_line(out: &mut impl Write, view: &ChatView, width: usize, row: u16) -> io::Result<u16> {
    let input: Vec<char> = view.input().chars().collect();
    let room = width.saturating_sub(PROMPT.len() + 1).max(1);

    // Scroll horizontally so the cursor stays visible.
    let start = view.cursor().saturating_sub(room);
    let visible: String = input.iter().skip(start).take(room).collect();

    queue!(
        out,
        MoveTo(0, row),
        SetForegroundColor(Color::Green),
        Print(PROMPT),
        ResetColor,
        Print(visible)
    )?;

    Ok((PROMPT.len() + view.cursor() - start) as u16)
}

fn status_line(out: &mut impl Write, view: &ChatView, width: usize, row: u16) -> io::Result<()> {
    queue!(out, MoveTo(0, row))?;
    match view.error() {
        Some(error) => queue!(out, SetForegroundColor(Color::Red), Print(truncate(error, width))),
        None => {
            let count = view.input().chars().count();
            let help = format!("{HELP} | {count}/{}", kn2chat_core::MAX_MESSAGE_CHARS);
            queue!(out, SetForegroundColor(Color::DarkGrey), Print(truncate(&help, width)))
        },
    }?;
    queue!(out, ResetColor)
}

/// The last `rows` wrapped transcript lines, flagged when they belong to a
/// server notice.
fn transcript_lines(view: &ChatView, width: usize, rows: usize) -> Vec<(String, bool)> {
    let mut lines = Vec::with_capacity(rows);
    for message in view.transcript().rev() {
        let wrapped = wrap(&format_message(message), width);
        for line in wrapped.into_iter().rev() {
            lines.push((line, message.is_system()));
            if lines.len() == rows {
                lines.reverse();
                return lines;
            }
        }
    }
    lines.reverse();
    lines
}

/// `[HH:MM] sender: text`, time in UTC.
pub fn format_message(message: &Message) -> String {
    let secs = message.timestamp();
    let (hours, minutes) = ((secs / 3600) % 24, (secs / 60) % 60);
    format!("[{hours:02}:{minutes:02}] {}: {}", message.sender(), message.text())
}

/// Hard-wrap at `width` characters.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width.max(1)).map(|chunk| chunk.iter().collect()).collect()
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn pad(text: &str, width: usize) -> String {
    let mut line = truncate(text, width);
    let len = line.chars().count();
    line.extend(std::iter::repeat_n(' ', width - len));
    line
}
