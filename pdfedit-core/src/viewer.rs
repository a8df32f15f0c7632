use tracing::debug;

use crate::error::EditResult;
use crate::pages::DocumentView;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    GotoInput(String),
    FirstPage,
    LastPage,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ZoomPercent(String),
    FitWidth { viewport: f32 },
    FitHeight { viewport: f32 },
    Rotate { delta: i32 },
}

impl DocumentView {
    /// Applies a viewer command. Returns whether the current page needs a redraw.
    pub fn apply(&mut self, command: ViewCommand) -> EditResult<bool> {
        debug!(?command, "applying view command");
        let redraw = match command {
            ViewCommand::NextPage { count } => {
                self.set_current_index(self.current_index.saturating_add(count))
            }
            ViewCommand::PrevPage { count } => {
                self.set_current_index(self.current_index.saturating_sub(count))
            }
            ViewCommand::GotoPage { page } => self.set_current_index(page),
            ViewCommand::GotoInput(text) => match text.trim().parse::<usize>() {
                Ok(page) if page >= 1 && page <= self.pages.len() => {
                    self.set_current_index(page - 1)
                }
                _ => false,
            },
            ViewCommand::FirstPage => self.set_current_index(0),
            ViewCommand::LastPage => self.set_current_index(usize::MAX),
            ViewCommand::ZoomIn => self.set_zoom(self.zoom * self.config.zoom_step),
            ViewCommand::ZoomOut => self.set_zoom(self.zoom / self.config.zoom_step),
            ViewCommand::ResetZoom => self.set_zoom(self.config.default_zoom),
            ViewCommand::ZoomPercent(text) => match text.trim().parse::<u32>() {
                Ok(percent) if percent > 0 => self.set_zoom(percent as f32 / 100.0),
                _ => false,
            },
            ViewCommand::FitWidth { viewport } => self.fit(viewport, |size| size.width)?,
            ViewCommand::FitHeight { viewport } => self.fit(viewport, |size| size.height)?,
            ViewCommand::Rotate { delta } => self.rotate_current(delta)?,
        };
        Ok(redraw)
    }

    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        if !zoom.is_finite() {
            return false;
        }
        let zoom = self.config.clamp_zoom(zoom);
        if (self.zoom - zoom).abs() > f32::EPSILON {
            self.zoom = zoom;
            true
        } else {
            false
        }
    }

    fn fit(
        &mut self,
        viewport: f32,
        extent: impl Fn(crate::engine::PageSize) -> f32,
    ) -> EditResult<bool> {
        let Some(page) = self.current_page() else {
            return Ok(false);
        };
        let size = self.page_size(page)?.rotated(page.rotation);
        let extent = extent(size);
        if extent <= 0.0 || viewport <= 0.0 {
            return Ok(false);
        }
        Ok(self.set_zoom(viewport / extent))
    }

    pub fn status_line(&self) -> String {
        let name = self
            .host_path()
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>");
        let zoom_percent = self.zoom * 100.0;
        let zoom_display = if zoom_percent.is_finite() {
            format!("{:.0}%", zoom_percent)
        } else {
            "—".to_string()
        };

        if self.pages.is_empty() {
            return format!("{} — no pages — {}", name, zoom_display);
        }

        let mut status = format!(
            "{} — page {}/{} — {}",
            name,
            self.current_index + 1,
            self.pages.len(),
            zoom_display
        );
        if let Some(page) = self.current_page() {
            if page.rotation.degrees() != 0 {
                status.push_str(&format!(" — {}°", page.rotation.degrees()));
            }
            if !self.is_local(page) {
                if let Some(source) = page.source.file_name().and_then(|s| s.to_str()) {
                    status.push_str(&format!(" — from {}", source));
                }
            }
        }
        status
    }
}
