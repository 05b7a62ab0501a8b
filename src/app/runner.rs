//! Command dispatch and the interactive queue loop.

use crate::app::cli::{Args, Command, RamAction};
use crate::app::config::{AppConfig, DeviceState, PersistentState, UserConfig};
use crate::app::events::{AppEvent, UserCommand, HELP};
use crate::player::classify::{scan_listing, ListingScan};
use crate::player::disk;
use crate::player::queue::format_duration;
use crate::player::songlengths::SongLengths;
use crate::player::{
    dump_memory, get_device, DeviceCommands, Finished, Origin, PendingPlan, PlanExecutor, PlaybackSession,
    PlayerState, UltimateDevice,
};
use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Fold CLI overrides into the loaded config
pub fn apply_overrides(config: &mut UserConfig, args: &Args) {
    if let Some(url) = &args.url {
        config.device.base_url = url.clone();
    }
    if let Some(password) = &args.password {
        config.device.password = password.clone();
    }
    if let Some(autostart) = args.autostart {
        config.playback.autostart = autostart.into();
    }
    if let Some(drive) = args.drive {
        config.playback.drive = drive.into();
    }
}

/// Entry point once config and logging are up. Must run inside a `LocalSet`.
pub async fn run(args: Args, mut config: UserConfig, mut state: PersistentState) -> Result<()> {
    apply_overrides(&mut config, &args);
    let state_path = AppConfig::get_state_path();

    let Some(command) = args.command else {
        bail!("No command given (try --help)");
    };

    match command {
        // Offline commands
        Command::Extract { image, output } => extract(&image, output),
        Command::Classify { files } => {
            classify(&files);
            Ok(())
        }
        Command::Songlength { path, song, db } => songlength(&config, &path, song, db),

        // Device commands
        Command::DumpConfig => {
            let device = connect(&config)?;
            let dump = device.dump_config().await.context("Failed to read device config")?;
            println!("{}", serde_json::to_string_pretty(&dump)?);
            Ok(())
        }
        Command::Ram {
            action: RamAction::Dump { output, address, length },
        } => {
            let device = connect(&config)?;
            ram_dump(&device, &output, address, length).await
        }
        Command::Play {
            files,
            remote,
            song,
            duration,
            shuffle,
            repeat,
        } => {
            let device = Rc::new(connect(&config)?);
            let identity = identity(&device).await;
            let mut session = build_session(&config, Rc::clone(&device), &state.device(&identity));

            let origin = if remote { Origin::Remote } else { Origin::Local };
            let paths = if remote { files } else { absolute_paths(&files) };
            session.clear();
            let override_ms = duration.map(|secs| secs * 1000);
            let added = session.add_paths_with_duration(&paths, origin, song, override_ms);
            for skipped in &added.skipped {
                eprintln!("⏭️  Skipping unsupported file: {}", skipped);
            }
            if added.ids.is_empty() {
                bail!("No supported files to play");
            }
            if shuffle {
                session.toggle_shuffle();
            }
            if repeat {
                session.toggle_repeat();
            }

            let result = interactive(&mut session).await;
            save(&mut state, &state_path, &identity, &session);
            result
        }
        Command::Stop | Command::Pause | Command::Resume { .. } => {
            let device = Rc::new(connect(&config)?);
            let identity = identity(&device).await;
            let mut session = build_session(&config, Rc::clone(&device), &state.device(&identity));

            let result = one_shot(&mut session, command).await;
            save(&mut state, &state_path, &identity, &session);
            result
        }
    }
}

fn connect(config: &UserConfig) -> Result<UltimateDevice> {
    get_device(
        &config.device.base_url,
        config.device.password(),
        config.device.timeout(),
    )
    .with_context(|| format!("Invalid device URL: {}", config.device.base_url))
}

/// Key for per-device state; falls back to the URL when the device is silent
async fn identity(device: &UltimateDevice) -> String {
    match device.info().await {
        Ok(info) => info
            .identity()
            .map(str::to_string)
            .unwrap_or_else(|| device.base_url().to_string()),
        Err(e) => {
            warn!(error = %e, "Device info unavailable, keying state by URL");
            device.base_url().to_string()
        }
    }
}

fn build_session<D: DeviceCommands>(
    config: &UserConfig,
    device: Rc<D>,
    saved: &DeviceState,
) -> PlaybackSession<D> {
    let mut session = PlaybackSession::new(
        device,
        config.playback.playback_settings(),
        config.playback.executor_settings(),
        config.audio.clone(),
    );

    if let Some(path) = config.playback.songlengths_path() {
        match SongLengths::locate(&path).map(|p| SongLengths::load(&p)) {
            Some(Ok(db)) => session = session.with_songlengths(db),
            Some(Err(e)) => warn!(error = %e, "Songlengths unavailable"),
            None => warn!(path = %path.display(), "No songlengths file found"),
        }
    }

    session.restore_state(saved.queue.clone(), saved.transport, saved.audio_snapshot.clone());
    session
}

fn save<D: DeviceCommands>(
    state: &mut PersistentState,
    path: &Path,
    identity: &str,
    session: &PlaybackSession<D>,
) {
    state.set_device(
        identity,
        DeviceState {
            queue: session.persisted_queue(),
            transport: session.queue().transport(),
            audio_snapshot: session.audio_snapshot(),
        },
    );
    if let Err(e) = state.save_to(path) {
        warn!(error = %e, "Failed to save state");
        eprintln!("⚠️  {:#}", e);
    }
}

fn absolute_paths(files: &[String]) -> Vec<String> {
    files
        .iter()
        .map(|f| {
            std::fs::canonicalize(f)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| f.clone())
        })
        .collect()
}

// --- One-shot transport ---

async fn one_shot<D: DeviceCommands>(session: &mut PlaybackSession<D>, command: Command) -> Result<()> {
    match command {
        Command::Stop => {
            let pending = session.stop().await;
            session.run(pending).await?;
            println!("⏹️  Stopped");
        }
        Command::Pause => match session.pause().await {
            Some(pending) => {
                session.run(pending).await?;
                println!("⏸️  Paused");
            }
            None if session.queue().transport() == PlayerState::Stopped => println!("Nothing is playing"),
            None => println!("Already paused"),
        },
        Command::Resume { discard_audio } => {
            if discard_audio {
                session.forget_audio();
            }
            match session.resume().await {
                Some(pending) => {
                    session.run(pending).await?;
                    println!("▶️  Resumed");
                }
                None if session.queue().transport() == PlayerState::Stopped => println!("Nothing to resume"),
                None => println!("Already playing"),
            }
        }
        other => bail!("Not a transport command: {:?}", other),
    }
    Ok(())
}

// --- Offline commands ---

async fn ram_dump<D: DeviceCommands>(device: &D, output: &Path, address: u16, length: u32) -> Result<()> {
    println!("⏸️  Freezing the machine to read memory");
    let started = Instant::now();
    let memory = dump_memory(device, address, length)
        .await
        .context("Memory dump failed")?;
    let elapsed = started.elapsed();
    info!(address, bytes = memory.len(), ?elapsed, "Memory dumped");

    std::fs::write(output, &memory).with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "💾 ${:04X}, {} bytes → {} in {} ms",
        address,
        memory.len(),
        output.display(),
        elapsed.as_millis()
    );
    Ok(())
}

fn extract(image: &Path, output: Option<PathBuf>) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let program = disk::extract_first_program(&name, &bytes)
        .with_context(|| format!("No runnable program in {}", image.display()))?;

    let output = output.unwrap_or_else(|| {
        let stem: String = program
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let stem = if stem.is_empty() { "program".to_string() } else { stem.to_lowercase() };
        PathBuf::from(format!("{}.prg", stem))
    });

    std::fs::write(&output, program.to_prg_bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "💾 {} → {} (${:04X}-${:04X}, {} bytes)",
        program.name,
        output.display(),
        program.load_address,
        program.end_address(),
        program.payload.len()
    );
    Ok(())
}

fn classify(files: &[String]) {
    match scan_listing(files.iter(), |f| f.as_str()) {
        ListingScan::Found(found) => {
            for (file, category) in found {
                println!("{:<6} {}", category.label(), file);
            }
        }
        ListingScan::NoSupportedFiles => println!("No supported files"),
    }
}

fn songlength(config: &UserConfig, path: &str, song: Option<u16>, db: Option<PathBuf>) -> Result<()> {
    let Some(location) = db.or_else(|| config.playback.songlengths_path()) else {
        bail!("No songlengths database configured (use --db or [playback] songlengths)");
    };
    let file = SongLengths::locate(&location)
        .with_context(|| format!("No songlengths file at {}", location.display()))?;
    let lengths = SongLengths::load(&file)?;

    match lengths.lookup(path, song) {
        Some(ms) => println!("{}", format_duration(ms)),
        None => println!("Unknown"),
    }
    Ok(())
}

// --- Interactive loop ---

fn spawn_plan<D: DeviceCommands + 'static>(
    executor: PlanExecutor<D>,
    pending: PendingPlan,
    tx: mpsc::Sender<AppEvent>,
) {
    tokio::task::spawn_local(async move {
        let result = executor.execute(pending.token, &pending.plan).await;
        let _ = tx.send(AppEvent::PlanFinished { pending, result }).await;
    });
}

fn print_status<D: DeviceCommands>(session: &PlaybackSession<D>) {
    let queue = session.queue();
    let icon = match queue.transport() {
        PlayerState::Playing => "▶️ ",
        PlayerState::Paused => "⏸️ ",
        PlayerState::Stopped => "⏹️ ",
    };
    let (total, played, remaining) = session.totals().formatted();

    match (queue.current_index(), queue.current_item()) {
        (Some(index), Some(item)) => println!(
            "{} {}/{} {} [{}]  {} played, {} left of {}",
            icon,
            index + 1,
            queue.len(),
            item.name,
            item.category,
            played,
            remaining,
            total
        ),
        _ => println!("{} {} item(s), {}", icon, queue.len(), total),
    }
}

fn print_queue<D: DeviceCommands>(session: &PlaybackSession<D>) {
    let queue = session.queue();
    for (index, item) in queue.items().iter().enumerate() {
        let marker = if queue.current_index() == Some(index) { "▶" } else { " " };
        let hidden = if queue.state().is_visible(index) { "" } else { " (hidden)" };
        println!(
            "{} {:>3}. {} [{}] {}{}",
            marker,
            index + 1,
            item.name,
            item.category,
            format_duration(queue.duration_of(item)),
            hidden
        );
    }
    let state = queue.state();
    println!(
        "shuffle: {}  repeat: {}",
        if state.shuffle { "on" } else { "off" },
        if state.repeat { "on" } else { "off" }
    );
}

/// Apply one typed command. Returns false on quit.
async fn handle<D: DeviceCommands + 'static>(
    session: &mut PlaybackSession<D>,
    command: UserCommand,
    tx: &mpsc::Sender<AppEvent>,
) -> bool {
    let pending = match command {
        UserCommand::Next => session.next().await,
        UserCommand::Previous => session.previous().await,
        UserCommand::Play(index) => session.play(index).await.map(Some),
        UserCommand::Remove(index) => session.remove(index).await,
        UserCommand::Stop => Ok(Some(session.stop().await)),
        UserCommand::Pause => Ok(session.pause().await),
        UserCommand::Resume => Ok(session.resume().await),
        UserCommand::Shuffle => {
            println!("🔀 Shuffle {}", if session.toggle_shuffle() { "on" } else { "off" });
            Ok(None)
        }
        UserCommand::Repeat => {
            println!("🔁 Repeat {}", if session.toggle_repeat() { "on" } else { "off" });
            Ok(None)
        }
        UserCommand::Filter(category) => {
            let hidden = session.toggle_filter(category);
            println!("{} {}", if hidden { "🙈 Hiding" } else { "👀 Showing" }, category);
            Ok(None)
        }
        UserCommand::Volume { channel, value } => {
            if let Err(e) = session.set_volume(&channel, &value).await {
                eprintln!("🔇 {}", e);
            }
            Ok(None)
        }
        UserCommand::Solo(channel) => {
            if let Err(e) = session.set_solo(channel.as_deref()).await {
                eprintln!("🔇 {}", e);
            }
            Ok(None)
        }
        UserCommand::List => {
            print_queue(session);
            Ok(None)
        }
        UserCommand::Help => {
            println!("{}", HELP);
            Ok(None)
        }
        UserCommand::Quit => return false,
    };

    match pending {
        Ok(Some(pending)) => spawn_plan(session.executor(), pending, tx.clone()),
        Ok(None) => {}
        Err(e) => eprintln!("❌ {}", e),
    }
    true
}

/// Read commands from stdin and play through the queue until `q` or EOF
async fn interactive<D: DeviceCommands + 'static>(session: &mut PlaybackSession<D>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(100);

    // 1. Input Task (std thread, never joined)
    let tx_input = tx.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.parse::<UserCommand>() {
                Ok(command) => {
                    if tx_input.blocking_send(AppEvent::Command(command)).is_err() {
                        return;
                    }
                }
                Err(message) if !message.is_empty() => eprintln!("{}", message),
                Err(_) => {}
            }
        }
        let _ = tx_input.blocking_send(AppEvent::InputClosed);
    });

    // 2. First item
    let first = match session.queue().current_index() {
        Some(index) => session.play(index).await.map(Some),
        None => session.next().await,
    };
    match first {
        Ok(Some(pending)) => spawn_plan(session.executor(), pending, tx.clone()),
        Ok(None) => {}
        Err(e) => eprintln!("❌ {}", e),
    }
    println!("Type h for help.");

    // 3. Event Loop
    let mut clock = tokio::time::interval(Duration::from_secs(1));
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::Command(command) => {
                        if !handle(session, command, &tx).await {
                            break;
                        }
                    }
                    AppEvent::PlanFinished { pending, result } => {
                        match session.finish(&pending, result).await {
                            Ok(Finished::Applied(_)) => print_status(session),
                            Ok(Finished::Discarded) => {}
                            Err(e) => eprintln!("❌ {}", e),
                        }
                    }
                    AppEvent::InputClosed => break,
                }
            }
            _ = clock.tick() => {
                let now = Instant::now();
                let delta = now.duration_since(last_tick).as_millis() as u64;
                last_tick = now;

                match session.tick(delta).await {
                    Ok(Some(pending)) => spawn_plan(session.executor(), pending, tx.clone()),
                    Ok(None) => {}
                    Err(e) => eprintln!("❌ {}", e),
                }
            }
        }
    }

    info!("Leaving interactive session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cli::{AutostartArg, DriveArg};
    use crate::player::fake::{Call, RecordingDevice};
    use crate::player::{AutostartMode, Drive};
    use clap::Parser;

    #[tokio::test]
    async fn test_ram_dump_writes_file_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ram.bin");
        let device = RecordingDevice::new();
        device.reads.borrow_mut().push_back(vec![0x60; 4096]);

        ram_dump(&device, &output, 0xE000, 0x4000).await.unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len(), 0x2000);
        assert_eq!(written[0], 0x60);
        let calls = device.calls();
        assert_eq!(calls.first(), Some(&Call::Pause));
        assert_eq!(calls.last(), Some(&Call::Resume));
        assert_eq!(calls.len(), 4);
    }

    #[test]
    fn test_overrides_win_over_config() {
        let args = Args::parse_from([
            "ultiplay",
            "stop",
            "--url",
            "http://10.0.0.2",
            "--password",
            "pw",
            "--autostart",
            "dma",
            "--drive",
            "b",
        ]);
        assert_eq!(args.autostart, Some(AutostartArg::Dma));
        assert_eq!(args.drive, Some(DriveArg::B));

        let mut config = UserConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.device.base_url, "http://10.0.0.2");
        assert_eq!(config.device.password(), Some("pw".to_string()));
        assert_eq!(config.playback.autostart, AutostartMode::Dma);
        assert_eq!(config.playback.drive, Drive::B);
    }

    #[test]
    fn test_extract_writes_prg() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("game.d64");
        std::fs::write(&image, disk::tests::sample_d64(0x0801)).unwrap();
        let output = dir.path().join("out.prg");

        extract(&image, Some(output.clone())).unwrap();
        let prg = std::fs::read(&output).unwrap();
        assert_eq!(&prg[..2], &[0x01, 0x08]);
    }

    #[test]
    fn test_extract_rejects_blank_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("blank.d64");
        std::fs::write(&image, vec![0u8; 100]).unwrap();
        assert!(extract(&image, Some(dir.path().join("x.prg"))).is_err());
    }
}
