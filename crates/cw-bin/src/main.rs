//! Layered-windows demo: a background pane, an anchored status window and a
//! boxed dialog stacked on top, updated until `q` is pressed.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use core_attr::Attr;
use core_caps::{Options, StaticTerminfo};
use core_term::{KeyInput, TermError, Terminal, TtyIo};
use core_window::acs;
use core_window::anchor::{AnchorPoint, Relation};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "cellwin-demo", version, about = "cellwin windowing demo")]
struct Args {
    /// Terminal name override (defaults to $TERM).
    #[arg(long)]
    term: Option<String>,
    /// Write a debug log to this file.
    #[arg(long)]
    log: Option<std::path::PathBuf>,
}

fn init_logging(args: &Args) -> Option<WorkerGuard> {
    let path = args.log.as_ref()?;
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file = path.file_name()?.to_owned();
    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let term_name = args
        .term
        .clone()
        .or_else(|| std::env::var("TERM").ok())
        .unwrap_or_else(|| "xterm".to_string());
    let source = StaticTerminfo::for_term(&term_name)
        .ok_or_else(|| anyhow!("no builtin terminfo entry for {term_name}"))?;

    let io = TtyIo::stdio().context("opening terminal")?;
    let mut term = Terminal::new(io, &source, &term_name, &Options::from_env())
        .map_err(|e| anyhow!("terminal init failed: {e}"))?;
    info!(term = %term_name, "demo starting");

    let (lines, columns) = term.size();
    let screen = &mut term.screen;
    let backdrop = screen
        .new_window(None, lines, columns, 0, 0, 10)
        .map_err(|e| anyhow!("backdrop: {e}"))?;
    screen.set_default_attrs(backdrop, Attr::bg(4) | Attr::fg(7));
    screen.show(backdrop);

    let dialog = screen
        .new_window(None, 7, 40, lines / 2 - 3, columns / 2 - 20, 0)
        .map_err(|e| anyhow!("dialog: {e}"))?;
    screen.show(dialog);

    let status = screen
        .new_window(None, 1, columns, 0, 0, 5)
        .map_err(|e| anyhow!("status: {e}"))?;
    screen
        .set_anchor(
            status,
            Some(backdrop),
            Relation::new(AnchorPoint::BottomLeft, AnchorPoint::BottomLeft),
        )
        .map_err(|e| anyhow!("status anchor: {e}"))?;
    screen.set_default_attrs(status, Attr::REVERSE);
    screen.show(status);

    term.box_frame(dialog, 0, 0, 7, 40, Attr::empty())
        .map_err(|e| anyhow!("box: {e}"))?;
    term.screen.set_paint(dialog, 2, 4);
    term.addstr(dialog, "cellwin demo", Attr::BOLD)
        .map_err(|e| anyhow!("draw: {e}"))?;
    term.screen.set_paint(dialog, 4, 4);
    term.addstr(dialog, "press q to quit, keys echo here", Attr::empty())
        .ok();
    term.screen.set_paint(status, 0, 1);
    term.addstr(status, "cellwin", Attr::empty()).ok();
    term.addch(status, acs::DIAMOND, Attr::ACS).ok();

    term.update().map_err(|e| anyhow!("update: {e}"))?;

    loop {
        match term.get_keychar(-1) {
            Ok(KeyInput::Byte(b'q')) => break,
            Ok(KeyInput::Byte(b)) => {
                term.screen.set_paint(dialog, 5, 4);
                term.screen.clrtoeol(dialog);
                // Redraw the right border the clear took out.
                term.screen.set_paint(dialog, 5, 39);
                term.addch(dialog, acs::VLINE, Attr::ACS).ok();
                term.screen.set_paint(dialog, 5, 4);
                let shown = if b.is_ascii_graphic() {
                    format!("key: {}", b as char)
                } else {
                    format!("key: 0x{b:02x}")
                };
                term.addstr(dialog, &shown, Attr::fg(3)).ok();
                term.update().map_err(|e| anyhow!("update: {e}"))?;
            }
            Ok(KeyInput::UpdateNeeded) => {
                info!("capability detection finished, repainting");
                term.redraw();
                term.update().map_err(|e| anyhow!("update: {e}"))?;
            }
            Err(TermError::Timeout) => continue,
            Err(e) => {
                warn!(error = %e, "input error, leaving");
                break;
            }
        }
    }

    term.restore();
    Ok(())
}
