// src/main.rs
mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use cli::Cli;
use eeg_monitor::config::Settings;
use eeg_monitor::engine;
use eeg_monitor::serial;
use eeg_monitor::types::{ConnectionState, ConnectionTarget, MonitorCommand, MonitorEvent};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let run_for = cli.run_duration()?;

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if cli.port != "auto" {
        settings.serial_port = cli.port.clone();
    }
    settings.validate().context("invalid settings")?;

    if cli.list_ports {
        let ports = serial::list_ports(&settings).context("enumerating serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            let tag = if port.is_bluetooth { " [bluetooth]" } else { "" };
            println!("{} - {}{}", port.device, port.description, tag);
        }
        return Ok(());
    }

    let target = if cli.simulate {
        ConnectionTarget::Simulation
    } else if cli.port == "auto" {
        ConnectionTarget::Serial(None)
    } else {
        ConnectionTarget::Serial(Some(cli.port.clone()))
    };

    // Ctrl-C ends the run through the normal shutdown path so an open
    // recording is closed and its sidecar written.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let (tx_cmd, rx_cmd) = channel();
    let (tx_event, rx_event) = channel();
    let handle = engine::spawn_thread(settings, tx_event, rx_cmd)
        .context("starting engine thread")?;

    let send = |cmd: MonitorCommand| {
        tx_cmd
            .send(cmd)
            .map_err(|_| anyhow!("engine thread is gone"))
    };
    send(MonitorCommand::Connect(target))?;
    if cli.record {
        send(MonitorCommand::StartRecording)?;
    }

    let deadline = run_for.map(|d| Instant::now() + d);
    loop {
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted, shutting down");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match rx_event.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                if !report(event) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(dir) = cli.snapshot_dir {
        send(MonitorCommand::SaveSpectrogram(dir.clone()))?;
        send(MonitorCommand::SaveWaveform(dir))?;
    }
    if let Some(path) = cli.csv {
        send(MonitorCommand::ExportCsv(path))?;
    }
    send(MonitorCommand::Shutdown)?;
    handle
        .join()
        .map_err(|_| anyhow!("engine thread panicked"))?;
    for event in rx_event.try_iter() {
        report(event);
    }
    Ok(())
}

/// Logs one engine event. Returns `false` when the link is gone for good.
fn report(event: MonitorEvent) -> bool {
    match event {
        MonitorEvent::Log(message) => info!("{message}"),
        MonitorEvent::Connection(state, message) => {
            info!("[{state:?}] {message}");
            if state == ConnectionState::Error {
                warn!("link lost, stopping");
                return false;
            }
        }
        MonitorEvent::Recording(state, message) => info!("[{state:?}] {message}"),
        MonitorEvent::Display(frame) => {
            debug!("display frame: {} samples", frame.values.len());
        }
        MonitorEvent::Spectrogram(frame) => {
            let bands: Vec<String> = frame
                .bands
                .iter()
                .map(|(band, power)| format!("{}={power:.2}", band.name()))
                .collect();
            match frame.bands.dominant() {
                Some(band) => info!("bands {} (dominant {})", bands.join(" "), band.name()),
                None => info!("bands {}", bands.join(" ")),
            }
        }
    }
    true
}
