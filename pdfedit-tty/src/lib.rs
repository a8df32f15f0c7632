use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{Clear, ClearType},
};
use pdfedit_core::{RenderImage, ViewCommand};
use png::{BitDepth, ColorType, Encoder};

const CHUNK_SIZE: usize = 4096;

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let encoded = BASE64.encode(encode_png(image)?);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn delete_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

fn encode_png(image: &RenderImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;
    Ok(buffer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitAxis {
    Width,
    Height,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(ViewCommand),
    Fit(FitAxis),
    DeleteCurrent,
    DuplicateCurrent,
    Save,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    GotoPrompt,
    ZoomPrompt,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    prompt: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match self.mode {
            InputMode::Normal => self.map_key_normal(code, modifiers),
            InputMode::GotoPrompt | InputMode::ZoomPrompt => self.map_key_prompt(code, modifiers),
        }
    }

    fn map_key_normal(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        let plain = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
        if modifiers.contains(KeyModifiers::CONTROL) {
            self.reset_count();
            return match code {
                KeyCode::Char('c') => UiEvent::Quit,
                _ => UiEvent::None,
            };
        }

        match code {
            KeyCode::Char(c) if c.is_ascii_digit() && modifiers.is_empty() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            KeyCode::Char('j') | KeyCode::Char(' ') | KeyCode::Down | KeyCode::Right
            | KeyCode::PageDown => {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::NextPage { count })
            }
            KeyCode::Char('k') | KeyCode::Up | KeyCode::Left | KeyCode::PageUp => {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::PrevPage { count })
            }
            KeyCode::Char('g') | KeyCode::Home if plain => match self.pending_count.take() {
                Some(page) => {
                    self.reset_count();
                    UiEvent::Command(ViewCommand::GotoPage {
                        page: page.saturating_sub(1),
                    })
                }
                None => UiEvent::Command(ViewCommand::FirstPage),
            },
            KeyCode::Char('G') | KeyCode::End => {
                self.reset_count();
                UiEvent::Command(ViewCommand::LastPage)
            }
            KeyCode::Char('+') => self.command(ViewCommand::ZoomIn),
            KeyCode::Char('-') => self.command(ViewCommand::ZoomOut),
            KeyCode::Char('=') => self.command(ViewCommand::ResetZoom),
            KeyCode::Char('r') => self.command(ViewCommand::Rotate { delta: 90 }),
            KeyCode::Char('R') => self.command(ViewCommand::Rotate { delta: -90 }),
            KeyCode::Char('w') => {
                self.reset_count();
                UiEvent::Fit(FitAxis::Width)
            }
            KeyCode::Char('f') => {
                self.reset_count();
                UiEvent::Fit(FitAxis::Height)
            }
            KeyCode::Char(':') => {
                self.enter(InputMode::GotoPrompt);
                UiEvent::None
            }
            KeyCode::Char('%') => {
                self.enter(InputMode::ZoomPrompt);
                UiEvent::None
            }
            KeyCode::Char('x') => {
                self.reset_count();
                UiEvent::DeleteCurrent
            }
            KeyCode::Char('y') => {
                self.reset_count();
                UiEvent::DuplicateCurrent
            }
            KeyCode::Char('s') => {
                self.reset_count();
                UiEvent::Save
            }
            KeyCode::Char('q') => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_prompt(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match code {
            KeyCode::Esc => {
                self.enter(InputMode::Normal);
                UiEvent::None
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.prompt);
                let command = match self.mode {
                    InputMode::ZoomPrompt => ViewCommand::ZoomPercent(text),
                    _ => ViewCommand::GotoInput(text),
                };
                self.enter(InputMode::Normal);
                UiEvent::Command(command)
            }
            KeyCode::Backspace => {
                self.prompt.pop();
                UiEvent::None
            }
            KeyCode::Char(c) if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT => {
                self.prompt.push(c);
                UiEvent::None
            }
            _ => UiEvent::None,
        }
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::GotoPrompt => Some(format!(":{}", self.prompt)),
            InputMode::ZoomPrompt => Some(format!("%{}", self.prompt)),
            InputMode::Normal if !self.pending_digits.is_empty() => {
                Some(self.pending_digits.clone())
            }
            InputMode::Normal => None,
        }
    }

    fn enter(&mut self, mode: InputMode) {
        self.reset_count();
        self.prompt.clear();
        self.mode = mode;
    }

    fn command(&mut self, command: ViewCommand) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn type_keys(mapper: &mut EventMapper, keys: &str) -> Vec<UiEvent> {
        keys.chars()
            .map(|c| mapper.map_event(key_event(KeyCode::Char(c))))
            .collect()
    }

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 0)).unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.starts_with("\u{1b}_Ga=T,f=100,"));
        assert!(output.contains("c=10,r=1,s=1,v=1"));
        assert!(output.contains(",m=0;"));
        assert!(output.ends_with("\u{1b}\\"));
    }

    #[test]
    fn kitty_draw_splits_large_payloads() {
        let mut renderer = KittyRenderer::new(Vec::new());
        // Alternating noise keeps the PNG well above one chunk.
        let pixels: Vec<u8> = (0..64 * 64 * 4)
            .map(|i: u32| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let image = RenderImage {
            width: 64,
            height: 64,
            pixels,
        };

        renderer.draw(&image, DrawParams::clamped(20, 10)).unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        let frames = output.matches("\u{1b}_G").count();
        assert!(frames > 1);
        assert_eq!(output.matches("m=1").count(), frames - 1);
        assert!(output.contains("\u{1b}_Gm=0,q=2;"));
    }

    #[test]
    fn draw_rejects_mismatched_pixel_buffer() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 2,
            height: 2,
            pixels: vec![0; 4],
        };
        assert!(renderer.draw(&image, DrawParams::clamped(1, 1)).is_err());
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_next_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(type_keys(&mut mapper, "12"), vec![UiEvent::None; 2]);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(ViewCommand::NextPage { count: 12 })
        );
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::Command(ViewCommand::PrevPage { count: 1 })
        );
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new();
        type_keys(&mut mapper, "4");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::Command(ViewCommand::ZoomIn)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::Command(ViewCommand::PrevPage { count: 1 })
        );
    }

    #[test]
    fn g_jumps_to_prefix_or_first_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(ViewCommand::FirstPage)
        );
        type_keys(&mut mapper, "7");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(ViewCommand::GotoPage { page: 6 })
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(ViewCommand::LastPage)
        );
    }

    #[test]
    fn rotate_fit_and_edit_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            type_keys(&mut mapper, "rRwfxysq="),
            vec![
                UiEvent::Command(ViewCommand::Rotate { delta: 90 }),
                UiEvent::Command(ViewCommand::Rotate { delta: -90 }),
                UiEvent::Fit(FitAxis::Width),
                UiEvent::Fit(FitAxis::Height),
                UiEvent::DeleteCurrent,
                UiEvent::DuplicateCurrent,
                UiEvent::Save,
                UiEvent::Quit,
                UiEvent::Command(ViewCommand::ResetZoom),
            ]
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Quit
        );
    }

    #[test]
    fn goto_prompt_collects_text_until_enter() {
        let mut mapper = EventMapper::new();
        type_keys(&mut mapper, ":");
        assert_eq!(mapper.mode(), InputMode::GotoPrompt);
        assert_eq!(type_keys(&mut mapper, "14q"), vec![UiEvent::None; 3]);
        mapper.map_event(key_event(KeyCode::Backspace));
        assert_eq!(mapper.pending_input().as_deref(), Some(":14"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(ViewCommand::GotoInput("14".into()))
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn zoom_prompt_and_escape() {
        let mut mapper = EventMapper::new();
        type_keys(&mut mapper, "%150");
        assert_eq!(mapper.pending_input().as_deref(), Some("%150"));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(ViewCommand::ZoomPercent("150".into()))
        );

        type_keys(&mut mapper, "3%20");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::None
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(ViewCommand::NextPage { count: 1 })
        );
    }

    #[test]
    fn status_line_is_written_verbatim() {
        let mut out = Vec::new();
        write_status_line(&mut out, "host.pdf — page 1/3 — 100%").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "host.pdf — page 1/3 — 100%");
    }
}
