use frame_scrub::capture::{
    total_frames, CancellationToken, CaptureConfig, CaptureDriver, CaptureProgress, CapturedFrames,
    FrameSource,
};
use frame_scrub::converter::{ConversionConfig, FrameConverter};
use frame_scrub::renderer::{format_status, Renderer};
use frame_scrub::sequence::FrameRef;
use frame_scrub::utils::{calculate_aspect_ratio, format_duration};
use frame_scrub::{
    export_archive, Cli, RemoteFrames, ScrubberError, Session, SourcePrompt, VideoDecoder,
    ViewerConfig, ARCHIVE_FILE_NAME, VERSION,
};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const HELP_TEXT: &str = r#"Frame Scrub Controls:

WHEEL/UP/DOWN  - Scroll through frames
PGUP/PGDN      - Scroll one page
HOME/END       - Jump to first/last frame
O              - Open a video file
G              - Generate frames from the video
C              - Cancel capture
E              - Export frames as zip
R              - Reset
Q/ESC          - Quit
H              - Toggle this help

Press H again to hide this help."#;

/// A capture running on the blocking pool
struct CaptureTask {
    handle: JoinHandle<frame_scrub::Result<CapturedFrames>>,
    progress: watch::Receiver<CaptureProgress>,
}

fn spawn_capture(
    path: PathBuf,
    config: CaptureConfig,
    token: CancellationToken,
) -> CaptureTask {
    let (tx, rx) = watch::channel(CaptureProgress::default());
    let handle = tokio::task::spawn_blocking(move || {
        let decoder = VideoDecoder::new(&path)?;
        let mut driver = CaptureDriver::new(decoder, config, token);
        driver.run(&tx)
    });
    CaptureTask {
        handle,
        progress: rx,
    }
}

fn spawn_preload(session: &Session, config: &ViewerConfig) -> Option<JoinHandle<RemoteFrames>> {
    if config.offline {
        return None;
    }
    let requests = session.sequence().preload_requests();
    if requests.is_empty() {
        return None;
    }
    info!("Preloading {} fallback frames", requests.len());
    Some(tokio::spawn(RemoteFrames::preload(
        requests,
        config.preload_concurrency,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let config = match ViewerConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    debug!("Effective configuration: {:?}", config);

    info!("Starting Frame Scrub v{}", VERSION);

    if let Some(ref path) = cli.file_path {
        if cli.info_only {
            return print_info(path, &config);
        }
        if let Some(ref target) = cli.export {
            return export_headless(path, target, &config).await;
        }
    }

    if !atty::is(atty::Stream::Stdout) {
        error!("The interactive viewer needs a terminal; use --export for headless capture");
        std::process::exit(1);
    }

    run_viewer(&cli, &config).await
}

fn print_info(path: &Path, config: &ViewerConfig) -> Result<()> {
    info!("Info-only mode: loading video information");
    let decoder = VideoDecoder::new(path)?;
    let video = decoder.info();

    println!("Video Information:");
    println!("  File: {}", path.display());
    println!("  Dimensions: {}x{}", video.width, video.height);
    println!("  Frame Rate: {:.2} FPS", video.fps);
    println!("  Duration: {} ({:.2} seconds)", format_duration(video.duration), video.duration);
    println!("  Aspect Ratio: {:.2}", calculate_aspect_ratio(video.width, video.height));
    println!(
        "  Capture: {} frames at {} samples/s",
        total_frames(video.duration, config.sample_rate),
        config.sample_rate
    );
    Ok(())
}

async fn export_headless(path: &Path, target: &Path, config: &ViewerConfig) -> Result<()> {
    info!("Capturing {} for export", path.display());

    let CaptureTask {
        handle,
        mut progress,
    } = spawn_capture(path.to_path_buf(), config.capture_config(), CancellationToken::new());

    let reporter = tokio::spawn(async move {
        let mut last = None;
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            if last != Some(snapshot.percent) {
                info!(
                    "Capture progress: {}% ({}/{})",
                    snapshot.percent, snapshot.completed, snapshot.total
                );
                last = Some(snapshot.percent);
            }
        }
    });

    let frames = handle.await??;
    let _ = reporter.await;

    // Let pending log output through before encoding
    tokio::task::yield_now().await;

    let count = frames.len();
    let target = target.to_path_buf();
    let written = tokio::task::spawn_blocking(move || {
        export_archive(frames.as_slice(), &target, &CancellationToken::new())
    })
    .await??;

    println!("Exported {} frames to {}", count, written.display());
    Ok(())
}

async fn run_viewer(cli: &Cli, config: &ViewerConfig) -> Result<()> {
    let mut renderer = Renderer::new(cli.transparent, cli.use_color(), cli.get_terminal_size()?);
    renderer.init()?;

    let converter = FrameConverter::new(ConversionConfig {
        palette: cli.palette.clone(),
        transparent: cli.transparent,
        ..Default::default()
    });

    let mut session = Session::new(config, renderer.frame_area().1 as f64);
    if let Some(ref path) = cli.file_path {
        session.select_source(path.clone());
    }

    let mut remote = RemoteFrames::new();
    let mut preload = spawn_preload(&session, config);
    let mut capture: Option<CaptureTask> = None;
    let mut export: Option<JoinHandle<frame_scrub::Result<PathBuf>>> = None;
    let mut notice: Option<String> = None;
    let mut prompt: Option<SourcePrompt> = None;
    let mut show_help = false;
    let mut dirty = true;
    let step = config.scroll_step;

    loop {
        // Handle input events
        if event::poll(Duration::from_millis(16))? {
            let page = renderer.frame_area().1 as f64;
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press && prompt.is_some() => {
                    match key_event.code {
                        KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                            info!("Ctrl+C pressed, exiting");
                            break;
                        }
                        KeyCode::Enter => {
                            if let Some(path) = prompt.take().and_then(SourcePrompt::submit) {
                                notice = Some(match session.open_source(path) {
                                    Ok(()) => "Video loaded, press g to generate".to_string(),
                                    Err(e) => e.to_string(),
                                });
                            }
                        }
                        KeyCode::Esc => prompt = None,
                        KeyCode::Backspace => {
                            if let Some(ref mut prompt) = prompt {
                                prompt.backspace();
                            }
                        }
                        KeyCode::Char(c) => {
                            if let Some(ref mut prompt) = prompt {
                                prompt.push(c);
                            }
                        }
                        _ => {}
                    }
                    dirty = true;
                }
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    match key_event.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            info!("Quit requested by user");
                            break;
                        }
                        KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                            info!("Ctrl+C pressed, exiting");
                            break;
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            session.scroll_by(step);
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            session.scroll_by(-step);
                        }
                        KeyCode::PageDown | KeyCode::Char(' ') => {
                            session.scroll_by(page);
                        }
                        KeyCode::PageUp => {
                            session.scroll_by(-page);
                        }
                        KeyCode::Home => {
                            session.jump_to_start();
                        }
                        KeyCode::End => {
                            session.jump_to_end();
                        }
                        KeyCode::Char('o') => {
                            prompt = Some(SourcePrompt::new());
                        }
                        KeyCode::Char('g') => match session.begin_capture() {
                            Ok(Some((path, token))) => {
                                info!("Generating frames from {}", path.display());
                                notice = None;
                                capture = Some(spawn_capture(path, config.capture_config(), token));
                            }
                            Ok(None) => notice = Some("No video file selected".to_string()),
                            Err(e) => notice = Some(e.to_string()),
                        },
                        KeyCode::Char('c') => {
                            session.cancel_capture();
                        }
                        KeyCode::Char('e') => match session.begin_export() {
                            Ok((frames, token)) => {
                                notice = Some("Exporting..".to_string());
                                // Show the exporting state before encoding starts
                                tokio::task::yield_now().await;
                                let target = PathBuf::from(ARCHIVE_FILE_NAME);
                                export = Some(tokio::task::spawn_blocking(move || {
                                    export_archive(frames.as_slice(), &target, &token)
                                }));
                            }
                            Err(e) => notice = Some(e.to_string()),
                        },
                        KeyCode::Char('r') => {
                            // Detach running tasks; the reset cancels both of them
                            session.reset();
                            capture = None;
                            export = None;
                            notice = None;
                            if remote.is_empty() && preload.is_none() {
                                preload = spawn_preload(&session, config);
                            }
                        }
                        KeyCode::Char('h') => {
                            show_help = !show_help;
                        }
                        _ => {}
                    }
                    dirty = true;
                }
                Event::Mouse(mouse_event) => match mouse_event.kind {
                    MouseEventKind::ScrollDown => {
                        session.scroll_by(step);
                        dirty = true;
                    }
                    MouseEventKind::ScrollUp => {
                        session.scroll_by(-step);
                        dirty = true;
                    }
                    _ => {}
                },
                Event::Resize(width, height) => {
                    debug!("Terminal resized to {}x{}", width, height);
                    renderer.set_dimensions(width, height);
                    session.set_viewport(renderer.frame_area().1 as f64);
                    dirty = true;
                }
                _ => {}
            }
        }

        if preload.as_ref().is_some_and(|handle| handle.is_finished()) {
            if let Some(handle) = preload.take() {
                match handle.await {
                    Ok(frames) => remote = frames,
                    Err(e) => warn!("Preload task failed: {}", e),
                }
                dirty = true;
            }
        }

        let capture_done = match capture.as_mut() {
            Some(task) => {
                if task.progress.has_changed().unwrap_or(false) {
                    session.update_progress(*task.progress.borrow_and_update());
                    dirty = true;
                }
                task.handle.is_finished()
            }
            None => false,
        };
        if capture_done {
            if let Some(task) = capture.take() {
                match task.handle.await {
                    Ok(Ok(frames)) => session.complete_capture(frames),
                    Ok(Err(e)) => {
                        session.fail_capture(&e);
                        notice = Some(e.to_string());
                    }
                    Err(e) => {
                        error!("Capture task failed: {}", e);
                        let e = ScrubberError::Io(std::io::Error::new(std::io::ErrorKind::Other, e));
                        session.fail_capture(&e);
                        notice = Some(e.to_string());
                    }
                }
                dirty = true;
            }
        }

        if export.as_ref().is_some_and(|handle| handle.is_finished()) {
            if let Some(handle) = export.take() {
                notice = match handle.await {
                    Ok(Ok(path)) => Some(format!("Saved {}", path.display())),
                    Ok(Err(e)) => {
                        error!("Download error: {}", e);
                        Some(e.to_string())
                    }
                    Err(e) => {
                        error!("Export task failed: {}", e);
                        Some(e.to_string())
                    }
                };
                session.finish_export();
                dirty = true;
            }
        }

        if !dirty {
            continue;
        }
        dirty = false;

        let mut status = format_status(
            session.frame_index(),
            session.sequence().len(),
            session.capture_state(),
            session.progress(),
            session.is_exporting(),
        );
        if let Some(ref text) = notice {
            status = format!("{} | {}", status, text);
        }
        if let Some(ref prompt) = prompt {
            status = format!("Open video: {}_", prompt.input());
        }

        if show_help {
            renderer.display_message(HELP_TEXT, &status)?;
            continue;
        }

        let (width, height) = renderer.frame_area();
        match session.current_frame() {
            FrameRef::Captured(frame) => {
                let ascii = converter.convert_image(&frame.image, width, height);
                renderer.render_frame_with_status(&ascii, &status)?;
            }
            FrameRef::Remote { index, url } => match remote.get(index) {
                Some(image) => {
                    let ascii = converter.convert_image(image, width, height);
                    renderer.render_frame_with_status(&ascii, &status)?;
                }
                None => {
                    renderer.display_message(&format!("Frame {:04}\n{}", index, url), &status)?;
                }
            },
            FrameRef::Unavailable { index, available } => {
                renderer.display_error(
                    &format!("Frame {} unavailable ({} captured)", index, available),
                    &status,
                )?;
            }
        }
    }

    // Cleanup
    info!("Cleaning up and exiting");
    session.cancel_capture();
    renderer.cleanup()?;

    info!("Viewer closed at frame {}", session.frame_index());
    Ok(())
}
