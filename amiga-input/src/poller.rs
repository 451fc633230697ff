//! Fixed-rate scheduling of the device decoders.
//!
//! An [`InputSession`] owns the bus, the sink and every decoder and runs one
//! tick at a time. A [`Poller`] moves the session onto a worker thread that
//! ticks at the configured cadence until stopped, then hands it back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use amiga_keymap::AMIGA_KEYMAP;
use tracing::{error, info, warn};

use crate::bus::RegisterBus;
use crate::config::PollerConfig;
use crate::error::{BusError, InputError, InputResult};
use crate::event::{Emitter, EventSink};
use crate::keyboard::KeyboardScanner;
use crate::lightpen::LightpenDecoder;
use crate::mouse::MouseDecoder;
use crate::registers::RegisterMap;
use crate::Device;

const WORKER_NAME: &str = "amiga-input-poller";

/// Counters accumulated over the life of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    /// Events accepted by the sink, sync markers included.
    pub delivered: u64,
    /// Events the sink rejected.
    pub dropped: u64,
    failures: [u64; 3],
}

impl SessionStats {
    /// Ticks in which `device` failed to scan.
    pub fn failures(&self, device: Device) -> u64 {
        self.failures[device.index()]
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.iter().sum()
    }
}

/// The bus, the sink and the state of every enabled device.
pub struct InputSession<B, S> {
    bus: B,
    sink: S,
    keyboard: Option<KeyboardScanner>,
    mouse: Option<MouseDecoder>,
    lightpen: Option<LightpenDecoder>,
    stats: SessionStats,
    config: PollerConfig,
    initialized: bool,
}

impl<B: RegisterBus, S: EventSink> InputSession<B, S> {
    pub fn new(bus: B, sink: S, config: &PollerConfig) -> Self {
        let registers = RegisterMap::for_chipset(config.chipset);

        Self {
            bus,
            sink,
            keyboard: config
                .keyboard
                .then(|| KeyboardScanner::new(&registers, &AMIGA_KEYMAP, config.settle())),
            mouse: (config.mouse && !config.mouse_ports.is_empty()).then(|| {
                MouseDecoder::new(&registers, &config.mouse_ports, config.max_mouse_delta)
            }),
            lightpen: config.lightpen.then(|| LightpenDecoder::new(&registers)),
            stats: SessionStats::default(),
            config: config.clone(),
            initialized: false,
        }
    }

    /// Validate the configuration, connect the bus and initialize every
    /// enabled device.
    ///
    /// A device whose initialization fails is disabled for the rest of the
    /// session. Fails on an invalid configuration, if the bus cannot connect
    /// or if no device is left. Calling it again after success does nothing.
    pub fn initialize(&mut self) -> InputResult<()> {
        if self.initialized {
            return Ok(());
        }

        self.config.validate()?;
        self.bus.connect()?;

        if let Some(keyboard) = self.keyboard.as_mut() {
            if let Err(source) = keyboard.init(&mut self.bus) {
                disable(Device::Keyboard, source);
                self.keyboard = None;
            }
        }

        if let Some(mouse) = self.mouse.as_mut() {
            if let Err(source) = mouse.init(&mut self.bus) {
                disable(Device::Mouse, source);
                self.mouse = None;
            }
        }

        // Kept even when the latch cannot be enabled; detection still works
        // if the display software sets LPEN itself.
        if let Some(lightpen) = self.lightpen.as_mut() {
            lightpen.init(&mut self.bus);
        }

        if self.active_devices().next().is_none() {
            return Err(InputError::NoDevices);
        }

        self.initialized = true;
        info!(
            keyboard = self.keyboard.is_some(),
            mouse = self.mouse.is_some(),
            lightpen = self.lightpen.is_some(),
            "input devices initialized"
        );
        Ok(())
    }

    /// Run one poll cycle: keyboard, then mouse, then lightpen.
    ///
    /// Each device's events are closed by their own sync before the next
    /// device runs. A failing device is logged and skipped for this tick
    /// only.
    pub fn tick(&mut self) {
        self.stats.ticks += 1;

        if let Some(keyboard) = self.keyboard.as_mut() {
            scan_device(
                &mut self.bus,
                &mut self.sink,
                &mut self.stats,
                Device::Keyboard,
                |bus, emitter| keyboard.poll(bus, emitter).map(drop),
            );
        }

        if let Some(mouse) = self.mouse.as_mut() {
            scan_device(
                &mut self.bus,
                &mut self.sink,
                &mut self.stats,
                Device::Mouse,
                |bus, emitter| mouse.poll(bus, emitter),
            );
        }

        if let Some(lightpen) = self.lightpen.as_mut() {
            scan_device(
                &mut self.bus,
                &mut self.sink,
                &mut self.stats,
                Device::Lightpen,
                |bus, emitter| lightpen.poll(bus, emitter),
            );
        }
    }

    /// Enabled devices, in scan order.
    pub fn active_devices(&self) -> impl Iterator<Item = Device> + '_ {
        Device::ALL.into_iter().filter(|device| match device {
            Device::Keyboard => self.keyboard.is_some(),
            Device::Mouse => self.mouse.is_some(),
            Device::Lightpen => self.lightpen.is_some(),
        })
    }
}

impl<B, S> InputSession<B, S> {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn keyboard(&self) -> Option<&KeyboardScanner> {
        self.keyboard.as_ref()
    }

    pub fn mouse(&self) -> Option<&MouseDecoder> {
        self.mouse.as_ref()
    }

    pub fn lightpen(&self) -> Option<&LightpenDecoder> {
        self.lightpen.as_ref()
    }

    pub fn into_parts(self) -> (B, S) {
        (self.bus, self.sink)
    }
}

fn disable(device: Device, source: BusError) {
    let err = InputError::DeviceInit { device, source };
    warn!(%device, error = %err, "device disabled");
}

fn scan_device<B, F>(
    bus: &mut B,
    sink: &mut dyn EventSink,
    stats: &mut SessionStats,
    device: Device,
    poll: F,
) where
    B: RegisterBus,
    F: FnOnce(&mut B, &mut Emitter<'_>) -> Result<(), BusError>,
{
    let mut emitter = Emitter::new(sink, device);
    let result = poll(bus, &mut emitter);
    let summary = emitter.finish();

    stats.delivered += summary.delivered as u64;
    stats.dropped += summary.dropped as u64;

    if let Err(e) = result {
        stats.failures[device.index()] += 1;
        warn!(%device, error = %e, "scan failed, retrying next tick");
    }
}

/// Runs an [`InputSession`] on a dedicated worker thread.
pub struct Poller<B, S> {
    interval: Duration,
    idle_sleep: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<InputSession<B, S>>>,
    session: Option<InputSession<B, S>>,
}

impl<B, S> Poller<B, S>
where
    B: RegisterBus + Send + 'static,
    S: EventSink + Send + 'static,
{
    pub fn new(bus: B, sink: S, config: &PollerConfig) -> Self {
        Self::with_session(InputSession::new(bus, sink, config), config)
    }

    pub fn with_session(session: InputSession<B, S>, config: &PollerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            idle_sleep: config.idle_sleep(),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            session: Some(session),
        }
    }

    /// Initialize the devices (first start only) and spawn the worker.
    pub fn start(&mut self) -> InputResult<()> {
        if self.worker.is_some() {
            return Err(InputError::AlreadyRunning);
        }

        let mut session = self.session.take().ok_or(InputError::SessionLost)?;
        if let Err(e) = session.initialize() {
            self.session = Some(session);
            return Err(e);
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let (interval, idle_sleep) = (self.interval, self.idle_sleep);

        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_loop(session, running, interval, idle_sleep))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                InputError::Spawn(e)
            })?;

        self.worker = Some(worker);
        info!(interval_us = interval.as_micros() as u64, "input poller started");
        Ok(())
    }

    /// Stop the worker after its current tick and take the session back.
    ///
    /// Returns the session statistics, or `None` if the poller was not
    /// running.
    pub fn stop(&mut self) -> InputResult<Option<SessionStats>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };

        self.running.store(false, Ordering::Release);

        match worker.join() {
            Ok(session) => {
                let stats = session.stats().clone();
                info!(ticks = stats.ticks, dropped = stats.dropped, "input poller stopped");
                self.session = Some(session);
                Ok(Some(stats))
            }
            Err(_) => {
                error!("input poller thread panicked");
                Err(InputError::WorkerPanicked)
            }
        }
    }

    /// Stop if running and return the session.
    pub fn into_session(mut self) -> InputResult<InputSession<B, S>> {
        self.stop()?;
        self.session.take().ok_or(InputError::SessionLost)
    }
}

impl<B, S> Poller<B, S> {
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The session, while the poller is stopped.
    pub fn session(&self) -> Option<&InputSession<B, S>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut InputSession<B, S>> {
        self.session.as_mut()
    }
}

impl<B, S> Drop for Poller<B, S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            warn!("input poller dropped while running, stopping");
            self.running.store(false, Ordering::Release);
            let _ = worker.join();
        }
    }
}

fn run_loop<B: RegisterBus, S: EventSink>(
    mut session: InputSession<B, S>,
    running: Arc<AtomicBool>,
    interval: Duration,
    idle_sleep: Duration,
) -> InputSession<B, S> {
    let mut last_tick: Option<Instant> = None;

    while running.load(Ordering::Acquire) {
        if last_tick.map_or(true, |at| at.elapsed() >= interval) {
            last_tick = Some(Instant::now());
            session.tick();
        } else {
            thread::sleep(idle_sleep);
        }
    }

    session
}
