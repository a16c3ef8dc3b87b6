//! Command execution.

use crate::bundle::{BundleService, CertificateBundle};
use crate::config::Config;
use crate::{Cli, Commands};
use colored::Colorize;
use lockprov_core::{
    BroadcastReporter, JsonFileRecordStore, LockRecordStore, MemoryRecordStore, ProgressEvent,
    ProgressReporter, ProvisionError, Provisioner, StepState, TrafficForwarder,
};
use lockprov_device::{ChunkedTransport, DeviceError, DeviceProbe, DeviceSlot, PresencePoller};
use lockprov_protocol::Frame;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

type CommandResult = Result<(), Box<dyn Error>>;

/// Executes a device or record command.
pub async fn execute(cli: Cli, config: Config) -> CommandResult {
    let wait = Duration::from_secs(cli.wait_secs);

    match cli.command {
        Commands::Frame { hex } => print_frame(&hex),

        Commands::Records => {
            let records = open_records(&config)?;
            let list = records.list()?;
            if list.is_empty() {
                println!("{}", "No lock records".dimmed());
            }
            for record in list {
                println!(
                    "#{:<5} {:<17} {:<15} {:<32} {}",
                    record.id,
                    record.lock_mac.as_deref().unwrap_or("-"),
                    record.imei.as_deref().unwrap_or("-"),
                    record.provisioning.as_deref().unwrap_or("-"),
                    record.updated_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
                );
            }
            Ok(())
        }

        Commands::Watch => {
            let station = Station::start(&config, cli.traffic)?;
            eprintln!("{}", "Watching for the lock, press Ctrl+C to stop...".dimmed());
            tokio::signal::ctrl_c().await?;
            station.stop().await;
            Ok(())
        }

        Commands::Info => {
            let station = Station::start(&config, cli.traffic)?;
            let result: Result<_, ProvisionError> = async {
                station.wait_for_device(wait).await?;
                let provisioner = station.provisioner((), Arc::new(MemoryRecordStore::new()));
                provisioner.read_device_info().await
            }
            .await;
            station.stop().await;

            let info = result?;
            println!("{} {}", "MAC: ".bold(), info.mac.to_string().cyan());
            println!("{} {}", "IMEI:".bold(), info.imei.cyan());
            Ok(())
        }

        Commands::Csr { out } => {
            let station = Station::start(&config, cli.traffic)?;
            let result: Result<_, ProvisionError> = async {
                station.wait_for_device(wait).await?;
                let provisioner = station.provisioner((), Arc::new(MemoryRecordStore::new()));
                provisioner.read_csr().await
            }
            .await;
            station.stop().await;

            let csr = result?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &csr)?;
                    eprintln!("{} CSR to {}", "Wrote".green(), path.display());
                }
                None => println!("{}", csr),
            }
            Ok(())
        }

        Commands::Provision { bundle, csr_out } => {
            let bundle = CertificateBundle::from_file(&bundle)?;
            let mut service = BundleService::new(bundle);
            if let Some(path) = csr_out {
                service = service.with_csr_out(path);
            }
            let records = open_records(&config)?;

            let station = Station::start(&config, cli.traffic)?;
            if let Err(e) = station.wait_for_device(wait).await {
                station.stop().await;
                return Err(e.into());
            }

            let provisioner = Arc::new(station.provisioner(service, records));
            let run = {
                let provisioner = provisioner.clone();
                tokio::spawn(async move { provisioner.run().await })
            };
            tokio::pin!(run);

            let report = tokio::select! {
                report = &mut run => report?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n{}", "Cancelling after the current step...".dimmed());
                    provisioner.cancel();
                    (&mut run).await?
                }
            };
            drop(provisioner);
            station.stop().await;

            if let Err(e) = report.result {
                // Already surfaced through the alert
                tracing::debug!("Run failed with {}", e.error_code());
                std::process::exit(1);
            }
            if let Some(id) = report.session.record_id {
                eprintln!("{} lock record #{}", "Provisioned".green(), id);
            }
            Ok(())
        }
    }
}

/// Prints the framed form of a hex command, one report per line.
pub fn print_frame(input: &str) -> CommandResult {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let command = hex::decode(cleaned)?;
    let frame = Frame::build(&command)?;

    for report in frame.reports() {
        println!("{}", hex::encode_upper(report));
    }
    eprintln!(
        "{} bytes, {} report(s), declared length {}, CRC {:04X}",
        frame.len(),
        frame.reports().len(),
        frame.declared_length(),
        frame.checksum()
    );
    Ok(())
}

fn open_records(config: &Config) -> Result<Arc<dyn LockRecordStore>, Box<dyn Error>> {
    match config.records.path {
        Some(ref path) => {
            let store = JsonFileRecordStore::open(path)?;
            tracing::debug!("Lock records at {}", store.path().display());
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryRecordStore::new())),
    }
}

#[cfg(feature = "usb")]
fn open_probe(config: &Config) -> Result<Box<dyn DeviceProbe>, DeviceError> {
    let probe = lockprov_device::hid::UsbProbe::new(&config.device.transport_config())?;
    Ok(Box::new(probe))
}

#[cfg(not(feature = "usb"))]
fn open_probe(_config: &Config) -> Result<Box<dyn DeviceProbe>, DeviceError> {
    Err(DeviceError::Unsupported)
}

/// The running pieces every device command shares: presence poller,
/// device slot and the console printer.
struct Station {
    slot: DeviceSlot,
    transport: Arc<ChunkedTransport>,
    reporter: Arc<BroadcastReporter>,
    poller: Arc<PresencePoller<Box<dyn DeviceProbe>>>,
    poll_interval: Duration,
    poller_task: JoinHandle<()>,
    printer_task: JoinHandle<()>,
}

impl Station {
    fn start(config: &Config, show_traffic: bool) -> Result<Self, DeviceError> {
        let probe = open_probe(config)?;
        let slot = DeviceSlot::new();
        let reporter = Arc::new(BroadcastReporter::new(config.progress.channel_capacity));

        let printer_task = {
            let mut events = reporter.subscribe();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => print_event(&event, show_traffic),
                        Err(RecvError::Lagged(n)) => {
                            eprintln!("{}: lagged {} events", "Warning".yellow(), n);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        let poller = Arc::new(PresencePoller::new(
            probe,
            slot.clone(),
            config.device.poll_interval(),
        ));
        let poller_task = {
            let reporter = reporter.clone();
            tokio::spawn(poller.clone().run(move |connected| {
                reporter.report(ProgressEvent::Connected { connected });
            }))
        };

        let sink: Arc<dyn ProgressReporter> = reporter.clone();
        let transport = Arc::new(
            ChunkedTransport::new(config.device.transport_config())
                .with_sink(Arc::new(TrafficForwarder(sink))),
        );

        Ok(Self {
            slot,
            transport,
            reporter,
            poller,
            poll_interval: config.device.poll_interval(),
            poller_task,
            printer_task,
        })
    }

    /// Waits up to `wait` for the poller to attach the lock.
    async fn wait_for_device(&self, wait: Duration) -> Result<(), DeviceError> {
        let deadline = Instant::now() + wait;
        let mut announced = false;

        loop {
            if self.slot.is_present() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::NotPresent);
            }
            if !announced {
                eprintln!("{}", "Waiting for the lock...".dimmed());
                announced = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn provisioner<S>(&self, service: S, records: Arc<dyn LockRecordStore>) -> Provisioner<S> {
        Provisioner::new(
            self.slot.clone(),
            self.transport.clone(),
            service,
            records,
            self.reporter.clone(),
        )
    }

    /// Stops polling and flushes pending output.
    async fn stop(self) {
        self.poller.shutdown();
        let _ = self.poller_task.await;

        // The printer ends once the last reporter handle is gone
        drop(self.transport);
        drop(self.reporter);
        drop(self.poller);
        let _ = tokio::time::timeout(Duration::from_secs(1), self.printer_task).await;
    }
}

fn print_event(event: &ProgressEvent, show_traffic: bool) {
    match event {
        ProgressEvent::Step {
            step,
            state,
            payload,
        } => {
            let marker = match state {
                StepState::Pending => "..".yellow(),
                StepState::Success => "ok".green(),
                StepState::Failed => "!!".red(),
            };
            match payload {
                Some(payload) if *state == StepState::Success => {
                    eprintln!("[{}] {} {}", marker, step, payload.to_string().dimmed())
                }
                _ => eprintln!("[{}] {}", marker, step),
            }
        }
        ProgressEvent::Traffic { direction, hex } => {
            if show_traffic {
                eprintln!("{} {}", format!("{:>8}", direction).dimmed(), hex);
            }
        }
        ProgressEvent::LockInfo {
            id,
            lock_mac,
            imei,
            status,
        } => {
            tracing::debug!(
                "Lock record {:?}: mac={:?} imei={:?} status={:?}",
                id,
                lock_mac,
                imei,
                status
            );
        }
        ProgressEvent::Connected { connected: true } => {
            eprintln!("{}", "Lock connected".green());
        }
        ProgressEvent::Connected { connected: false } => {
            eprintln!("{}", "Lock disconnected".yellow());
        }
        ProgressEvent::Alert { message } => {
            eprintln!("{}: {}", "Error".red(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_print_frame() {
        assert!(print_frame("00014000").is_ok());
        assert!(print_frame("00 01 40 01").is_ok());
        assert!(print_frame("zz").is_err());
        assert!(print_frame("000").is_err());
    }

    #[tokio::test]
    async fn test_execute_frame() {
        let cli = Cli::try_parse_from(["lockprov", "frame", "00014000"]).unwrap();
        assert!(execute(cli, Config::default()).await.is_ok());

        let cli = Cli::try_parse_from(["lockprov", "frame", "zz"]).unwrap();
        assert!(execute(cli, Config::default()).await.is_err());
    }

    #[test]
    fn test_open_records() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.records.path = Some(dir.path().join("locks.json"));

        let store = open_records(&config).unwrap();
        let record = store.create().unwrap();
        assert!(dir.path().join("locks.json").exists());

        let reopened = open_records(&config).unwrap();
        assert_eq!(reopened.get(record.id).unwrap(), record);

        config.records.path = None;
        assert!(open_records(&config).unwrap().list().unwrap().is_empty());
    }
}
