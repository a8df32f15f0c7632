use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType, WindowSize};
use pdfedit_core::{DocumentView, RenderImage, StateStore, ViewCommand};
use pdfedit_tty::{write_status_line, DrawParams, EventMapper, FitAxis, KittyRenderer, UiEvent};
use tracing::{info, warn};

const FALLBACK_CELL: (f32, f32) = (8.0, 16.0);

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

enum LoopAction {
    ContinueRedraw,
    Continue,
    Quit,
}

struct Viewer {
    view: DocumentView,
    output: Option<PathBuf>,
    notice: Option<String>,
}

pub fn run(
    mut view: DocumentView,
    store: &dyn StateStore,
    page: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Err(err) = view.recall(store) {
        warn!(?err, "failed to load view state");
    }
    if let Some(page) = page {
        view.apply(ViewCommand::GotoPage {
            page: page.saturating_sub(1),
        })?;
    }

    let mut viewer = Viewer {
        view,
        output,
        notice: None,
    };
    {
        let _raw = RawModeGuard::new()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, cursor::Hide)?;
        let mut renderer = KittyRenderer::new(stdout);
        let result = event_loop(&mut renderer, &mut viewer);
        let cleanup = renderer
            .delete_images()
            .and_then(|_| renderer.clear_all());
        result?;
        cleanup?;
    }

    viewer.view.release_resources();
    viewer.view.remember(store)?;
    info!(page = viewer.view.current_index(), "viewer closed");
    Ok(())
}

fn event_loop(renderer: &mut KittyRenderer<Stdout>, viewer: &mut Viewer) -> Result<()> {
    let mut mapper = EventMapper::new();
    let mut dirty = true;
    renderer.clear_all()?;

    loop {
        if dirty {
            redraw(renderer, viewer, mapper.pending_input().as_deref())?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let ev = event::read()?;
        if matches!(ev, Event::Resize(..)) {
            renderer.clear_all()?;
            dirty = true;
            continue;
        }

        match handle_event(mapper.map_event(ev), viewer)? {
            LoopAction::ContinueRedraw => dirty = true,
            LoopAction::Continue => {
                let layout = Layout::from_window(terminal::window_size()?);
                let status = combine_status(viewer.status(), mapper.pending_input().as_deref());
                draw_status_line(renderer, &layout, &status)?;
            }
            LoopAction::Quit => return Ok(()),
        }
    }
}

fn handle_event(event: UiEvent, viewer: &mut Viewer) -> Result<LoopAction> {
    if !matches!(event, UiEvent::None) {
        viewer.notice = None;
    }

    let outcome = match event {
        UiEvent::Quit => return Ok(LoopAction::Quit),
        UiEvent::None => return Ok(LoopAction::Continue),
        UiEvent::Command(command) => viewer.view.apply(command),
        UiEvent::Fit(axis) => {
            let (width, height) = Layout::from_window(terminal::window_size()?).viewport_pixels();
            let command = match axis {
                FitAxis::Width => ViewCommand::FitWidth { viewport: width },
                FitAxis::Height => ViewCommand::FitHeight { viewport: height },
            };
            viewer.view.apply(command)
        }
        UiEvent::DeleteCurrent => Ok(viewer.delete_current()),
        UiEvent::DuplicateCurrent => Ok(viewer.duplicate_current()),
        UiEvent::Save => Ok(viewer.save()),
    };

    match outcome {
        Ok(true) => Ok(LoopAction::ContinueRedraw),
        Ok(false) => Ok(LoopAction::Continue),
        Err(err) => {
            warn!(%err, "viewer command failed");
            viewer.notice = Some(err.to_string());
            Ok(LoopAction::Continue)
        }
    }
}

impl Viewer {
    fn status(&self) -> String {
        match &self.notice {
            Some(notice) => format!("{} | {}", self.view.status_line(), notice),
            None => self.view.status_line(),
        }
    }

    fn delete_current(&mut self) -> bool {
        let Some(id) = self.view.current_page().map(|page| page.id) else {
            return false;
        };
        self.view.delete(&[id]);
        self.notice = Some(format!("deleted page, {} left", self.view.len()));
        true
    }

    fn duplicate_current(&mut self) -> bool {
        let Some(id) = self.view.current_page().map(|page| page.id) else {
            return false;
        };
        self.view.duplicate(&[id]);
        self.notice = Some("duplicated page".to_owned());
        true
    }

    fn save(&mut self) -> bool {
        let Some(path) = self.output.clone() else {
            self.notice = Some("no output file; start with --output <file>".to_owned());
            return false;
        };
        match self.view.save(&path) {
            Ok(report) => {
                self.notice = Some(format!(
                    "saved {} pages to {}",
                    report.pages,
                    report.destination.display()
                ));
            }
            Err(err) => {
                warn!(%err, "save failed");
                self.notice = Some(err.to_string());
            }
        }
        false
    }
}

fn redraw(
    renderer: &mut KittyRenderer<Stdout>,
    viewer: &mut Viewer,
    pending_input: Option<&str>,
) -> Result<()> {
    let layout = Layout::from_window(terminal::window_size()?);
    renderer.begin_sync_update()?;

    match viewer.view.render_current() {
        Ok(Some(image)) => {
            let (cols, rows) = layout.cells_for(&image);
            let (col, row) = layout.origin(cols, rows);
            {
                let mut writer = renderer.writer();
                crossterm::execute!(&mut writer, cursor::MoveTo(col as u16, row as u16))?;
            }
            renderer.draw(&image, DrawParams::clamped(cols, rows))?;
        }
        Ok(None) => renderer.delete_images()?,
        Err(err) => {
            warn!(%err, page = viewer.view.current_index(), "failed to render page");
            renderer.delete_images()?;
            viewer.notice = Some(err.to_string());
        }
    }

    let status = combine_status(viewer.status(), pending_input);
    draw_status_line(renderer, &layout, &status)?;
    renderer.end_sync_update()?;

    let range = viewer.view.config().prefetch_range;
    if let Err(err) = viewer.view.prefetch_neighbors(range, viewer.view.zoom()) {
        warn!(
            %err,
            page = viewer.view.current_index(),
            "failed to prefetch neighboring pages"
        );
    }
    Ok(())
}

fn combine_status(mut base: String, pending_input: Option<&str>) -> String {
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        base.push_str(" | ");
        base.push_str(pending);
    }
    base
}

fn draw_status_line(
    renderer: &mut KittyRenderer<Stdout>,
    layout: &Layout,
    status: &str,
) -> Result<()> {
    let status_row = layout.rows.saturating_sub(1);
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row as u16),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(&mut writer, status)?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    columns: u32,
    rows: u32,
    cell_width: f32,
    cell_height: f32,
}

impl Layout {
    fn from_window(window: WindowSize) -> Self {
        let columns = u32::from(window.columns).max(1);
        let rows = u32::from(window.rows).max(1);
        Self {
            columns,
            rows,
            cell_width: f32::from(window.width) / columns as f32,
            cell_height: f32::from(window.height) / rows as f32,
        }
    }

    fn cell_size(&self) -> (f32, f32) {
        if self.cell_width > 0.0 && self.cell_height > 0.0 {
            (self.cell_width, self.cell_height)
        } else {
            FALLBACK_CELL
        }
    }

    fn image_area(&self) -> (u32, u32) {
        let rows = self.rows.saturating_sub(1);
        (
            self.columns.saturating_sub(2).max(1),
            rows.saturating_sub(2).max(1),
        )
    }

    fn viewport_pixels(&self) -> (f32, f32) {
        let (cols, rows) = self.image_area();
        let (cell_width, cell_height) = self.cell_size();
        (cols as f32 * cell_width, rows as f32 * cell_height)
    }

    fn cells_for(&self, image: &RenderImage) -> (u32, u32) {
        let (max_cols, max_rows) = self.image_area();
        if image.width == 0 || image.height == 0 {
            return (max_cols, max_rows);
        }
        let (cell_width, cell_height) = self.cell_size();
        let (area_width, area_height) = self.viewport_pixels();
        let shrink = (area_width / image.width as f32)
            .min(area_height / image.height as f32)
            .min(1.0);

        let cols = (image.width as f32 * shrink / cell_width)
            .round()
            .clamp(1.0, max_cols as f32) as u32;
        let rows = (image.height as f32 * shrink / cell_height)
            .round()
            .clamp(1.0, max_rows as f32) as u32;
        (cols, rows)
    }

    fn origin(&self, cols: u32, rows: u32) -> (u32, u32) {
        let rows_above_status = self.rows.saturating_sub(1);
        (
            self.columns.saturating_sub(cols) / 2,
            rows_above_status.saturating_sub(rows) / 2,
        )
    }
}
