mod view;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use image::RgbaImage;
use pdfedit_core::{
    parse_steps, project_dirs, Config, DocumentView, ExportReport, FileStateStore, PdfEngine,
    Selection,
};
use pdfedit_render::PdfiumEngine;
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pdfedit",
    version,
    about = "Terminal PDF viewer and page editor"
)]
struct Cli {
    /// Configuration file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pdfium shared library, or the directory that holds it
    #[arg(long, global = true)]
    pdfium: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Page through a document in a kitty-compatible terminal
    View {
        file: PathBuf,
        /// Page to open on (1-based)
        #[arg(short = 'p', long = "page")]
        page: Option<usize>,
        /// Where the `s` key saves the edited page list
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print page count and page sizes
    Info {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a page selection such as `1,3-5` against a page count
    Select {
        pattern: String,
        #[arg(short = 'n', long = "count")]
        count: usize,
    },
    /// Write the selected pages to a new file
    Export {
        file: PathBuf,
        #[arg(short = 'p', long = "pages", default_value = "all")]
        pages: String,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Rasterization scale, pixels per point
        #[arg(long)]
        scale: Option<f32>,
    },
    /// Apply edit steps (`delete=2`, `rotate=odd@90`, `merge=end@other.pdf`, ...) and save
    Edit {
        file: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(required = true)]
        steps: Vec<String>,
    },
    /// Render every page to a PNG thumbnail
    Thumbnails {
        file: PathBuf,
        #[arg(long = "out-dir")]
        out_dir: PathBuf,
        #[arg(long)]
        zoom: Option<f32>,
    },
}

struct App {
    config: Config,
    dirs: Option<ProjectDirs>,
}

impl App {
    fn engine(&self) -> Result<Arc<dyn PdfEngine>> {
        let engine = PdfiumEngine::new(self.config.pdfium_library.as_deref())?;
        Ok(Arc::new(engine))
    }

    fn open(&self, file: &Path) -> Result<DocumentView> {
        DocumentView::open(self.engine()?, file, self.config.clone())
            .with_context(|| format!("failed to open {:?}", file))
    }

    fn override_export_scale(&mut self, scale: Option<f32>) -> Result<()> {
        if let Some(scale) = scale {
            self.config.export_scale = scale;
            self.config.validate()?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(library) = cli.pdfium {
        config.pdfium_library = Some(library);
    }
    let dirs = project_dirs();
    let interactive = matches!(cli.command, Commands::View { .. });
    let _log_guard = init_logging(dirs.as_ref(), &config.log_filter, !interactive)?;
    let mut app = App { config, dirs };

    match cli.command {
        Commands::View { file, page, output } => run_view(&app, &file, page, output),
        Commands::Info { file, json } => run_info(&app, &file, json),
        Commands::Select { pattern, count } => {
            println!("{}", format_selection(&pattern, count));
            Ok(())
        }
        Commands::Export {
            file,
            pages,
            output,
            scale,
        } => {
            app.override_export_scale(scale)?;
            let view = app.open(&file)?;
            let selection = pages.parse().unwrap_or(Selection::None);
            let report = view.export(&view.ids_for(&selection), &output)?;
            print_report(&report);
            Ok(())
        }
        Commands::Edit {
            file,
            output,
            scale,
            steps,
        } => {
            let steps = parse_steps(&steps)?;
            app.override_export_scale(scale)?;
            let mut view = app.open(&file)?;
            view.apply_steps(&steps)?;
            let report = view.save(&output)?;
            print_report(&report);
            Ok(())
        }
        Commands::Thumbnails {
            file,
            out_dir,
            zoom,
        } => {
            if let Some(zoom) = zoom {
                app.config.thumbnail_zoom = zoom;
                app.config.validate()?;
            }
            run_thumbnails(&app, &file, &out_dir)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("config file {:?} does not exist", path));
            }
            path.to_path_buf()
        }
        None => match Config::default_path() {
            Some(path) => path,
            None => return Ok(Config::default()),
        },
    };
    Ok(Config::load(&path)?)
}

fn run_view(app: &App, file: &Path, page: Option<usize>, output: Option<PathBuf>) -> Result<()> {
    let dirs = app
        .dirs
        .as_ref()
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let store = FileStateStore::new(dirs.data_local_dir().join("state"))?;
    let view = app.open(file)?;
    view::run(view, &store, page, output)
}

#[derive(Debug, Serialize)]
struct InfoReport {
    path: PathBuf,
    pages: Vec<PageInfo>,
}

#[derive(Debug, Serialize)]
struct PageInfo {
    number: usize,
    width: f32,
    height: f32,
}

fn run_info(app: &App, file: &Path, json: bool) -> Result<()> {
    let view = app.open(file)?;
    let pages = view
        .pages()
        .iter()
        .enumerate()
        .map(|(idx, page)| -> Result<PageInfo> {
            let size = view.page_size(page)?;
            Ok(PageInfo {
                number: idx + 1,
                width: size.width,
                height: size.height,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let report = InfoReport {
        path: view.host_path().to_path_buf(),
        pages,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {} pages", report.path.display(), report.pages.len());
        for page in &report.pages {
            println!(
                "{:>5}  {:.0} x {:.0} pt",
                page.number, page.width, page.height
            );
        }
    }
    Ok(())
}

fn format_selection(pattern: &str, count: usize) -> String {
    let selection = pattern.parse().unwrap_or(Selection::None);
    selection
        .resolve(count)
        .into_iter()
        .map(|idx| (idx + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn run_thumbnails(app: &App, file: &Path, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {:?}", out_dir))?;
    let view = app.open(file)?;

    for (idx, id) in view.ids().into_iter().enumerate() {
        let image = view.render_thumbnail(id)?;
        let buffer = RgbaImage::from_raw(image.width, image.height, image.pixels)
            .ok_or_else(|| anyhow!("page {} rendered an invalid pixel buffer", idx + 1))?;
        let path = out_dir.join(format!("page-{:03}.png", idx + 1));
        buffer
            .save(&path)
            .with_context(|| format!("failed to write {:?}", path))?;
    }
    info!(pages = view.len(), dir = %out_dir.display(), "wrote thumbnails");
    println!("{} thumbnails written to {}", view.len(), out_dir.display());
    Ok(())
}

fn print_report(report: &ExportReport) {
    if report.pages == 0 {
        println!("nothing to export; {} was not written", report.destination.display());
    } else {
        println!(
            "wrote {} pages to {}",
            report.pages,
            report.destination.display()
        );
    }
}

fn init_logging(
    dirs: Option<&ProjectDirs>,
    default_filter: &str,
    console: bool,
) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_dir = dirs.map(|dirs| dirs.data_local_dir().join("logs"));
    let (file_layer, guard) = match log_dir {
        Some(log_dir) if fs::create_dir_all(&log_dir).is_ok() => {
            let file_appender = tracing_appender::rolling::never(log_dir, "pdfedit.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_ansi(false).with_writer(file_writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };
    let console_layer = console.then(|| fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn selection_output_is_one_based() {
        assert_eq!(format_selection("1,3-5,8", 6), "1,3,4,5");
        assert_eq!(format_selection("even", 5), "2,4");
        assert_eq!(format_selection("none", 5), "");
        assert_eq!(format_selection("9-7", 8), "7,8");
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join("config.toml");
        fs::write(&path, "export_scale = 1.5\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.export_scale, 1.5);
        assert_eq!(config.zoom_step, Config::default().zoom_step);
    }

    #[test]
    fn parses_edit_steps_with_negative_rotation() {
        let cli = Cli::try_parse_from([
            "pdfedit",
            "edit",
            "in.pdf",
            "-o",
            "out.pdf",
            "rotate=even@-90",
            "delete=1",
        ])
        .unwrap();
        match cli.command {
            Commands::Edit { steps, output, .. } => {
                assert_eq!(steps, vec!["rotate=even@-90", "delete=1"]);
                assert_eq!(output, PathBuf::from("out.pdf"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
