use crate::config::ReceiverConfig;
use crate::error::{AvrError, Result};
use crate::feedback::FeedbackReceiver;
use crate::monitor::{self, Activity};
use crate::poll::{self, PollSchedule};
use crate::protocol::{self, CHANNEL_MAX, CHANNEL_MIN};
use crate::queue::{self, LineSender};
use crate::ramp::{Direction, RampCoordinator, RampState, RampTarget};
use crate::reconciler::Reconciler;
use crate::selection::SelectableItem;
use crate::state::{DeviceSnapshot, DeviceState, Phase, Shared, Timing, Zone};
use crate::transport::{CommandSink, TcpTransport, Transport};
use crate::types::{self, ChannelVolume, Level, NormalizedLevel, SurroundChannel, SurroundMode};
use crate::zone2::Zone2;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct MainVolumeTarget {
    shared: Arc<Shared>,
    sink: CommandSink,
}

impl RampTarget for MainVolumeTarget {
    fn current_level(&self) -> Level {
        self.shared.lock().volume_level
    }

    fn bounds(&self) -> (Level, Level) {
        (0, self.shared.lock().max_volume())
    }

    fn send_level(&self, level: Level) -> Result<()> {
        let generation = self.shared.lock().generation;
        self.sink.send(&protocol::master_volume(level, generation)?)
    }
}

struct ChannelVolumeTarget {
    channel: SurroundChannel,
    shared: Arc<Shared>,
    sink: CommandSink,
}

impl RampTarget for ChannelVolumeTarget {
    fn current_level(&self) -> Level {
        // an unseen channel starts from 0 dB rather than the floor
        self.shared
            .lock()
            .channels
            .get(self.channel)
            .map(|cv| cv.level)
            .filter(|level| *level >= CHANNEL_MIN)
            .unwrap_or((CHANNEL_MIN + CHANNEL_MAX) / 2)
    }

    fn bounds(&self) -> (Level, Level) {
        (CHANNEL_MIN, CHANNEL_MAX)
    }

    fn send_level(&self, level: Level) -> Result<()> {
        let generation = self.shared.lock().generation;
        self.sink
            .send(&protocol::channel_volume(self.channel, level, generation)?)
    }
}

/// Control interface for one AV receiver
///
/// Owns the device model. Received lines are applied by a background worker;
/// commands are encoded and written to the transport without waiting for the
/// device. Cloning yields another handle to the same receiver.
///
/// # Example
///
/// ```no_run
/// use marantz_avr::{AvReceiver, ReceiverConfig, SurroundMode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let receiver = AvReceiver::connect("192.168.1.50", 23, ReceiverConfig::default()).await?;
///     receiver.power_on()?;
///     receiver.select_input("BD")?;
///     receiver.select_surround_mode(SurroundMode::DolbyDigital)?;
///
///     let mut feedback = receiver.subscribe();
///     while let Ok(update) = feedback.recv().await {
///         println!("{:?}", update);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AvReceiver {
    shared: Arc<Shared>,
    sink: CommandSink,
    config: Arc<ReceiverConfig>,
    lines: LineSender,
    health: Arc<watch::Sender<bool>>,
    activity: Activity,
    main_ramp: Arc<RampCoordinator>,
    channel_ramps: Arc<Mutex<HashMap<SurroundChannel, Arc<RampCoordinator>>>>,
    zone2: Option<Zone2>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AvReceiver {
    /// Build a receiver over an existing transport
    ///
    /// Feed received lines through [`AvReceiver::line_sender`] and report
    /// link health with [`AvReceiver::set_link_health`]. Must be called from
    /// within a tokio runtime.
    pub fn new(config: ReceiverConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let (lines, rx) = queue::channel();
        Self::build(config, transport, lines, rx)
    }

    /// Connect over TCP and start the communication monitor
    pub async fn connect(host: &str, port: u16, config: ReceiverConfig) -> Result<Self> {
        let (lines, rx) = queue::channel();
        let transport = TcpTransport::connect(host, port, lines.clone()).await?;
        let receiver = Self::build(config, Arc::new(transport), lines, rx)?;
        receiver.start_monitor();
        Ok(receiver)
    }

    /// Connect using the `control` block of the configuration
    pub async fn connect_from_config(config: ReceiverConfig) -> Result<Self> {
        let control = config
            .control
            .clone()
            .ok_or_else(|| AvrError::Config("No control block in configuration".to_string()))?;
        Self::connect(&control.address, control.port, config).await
    }

    fn build(
        config: ReceiverConfig,
        transport: Arc<dyn Transport>,
        lines: LineSender,
        rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    ) -> Result<Self> {
        config.validate()?;
        types::validate_tables()?;

        let runtime = Handle::try_current()
            .map_err(|e| AvrError::Config(format!("No tokio runtime: {}", e)))?;
        let timing = Timing {
            warming: Duration::from_millis(config.warming_time_ms),
            cooling: Duration::from_millis(config.cooling_time_ms),
        };
        let state = DeviceState::new(config.generation, config.max_volume_override);
        let shared = Shared::new(state, timing, runtime.clone());
        let sink = CommandSink::new(transport);

        let main_ramp = Arc::new(RampCoordinator::new(
            "master volume",
            Arc::new(MainVolumeTarget {
                shared: Arc::clone(&shared),
                sink: sink.clone(),
            }),
            config.generation.step(),
            config.ramp_interval(),
            runtime.clone(),
        ));

        let zone2 = config
            .enable_zone2
            .then(|| Zone2::new(Arc::clone(&shared), sink.clone(), config.ramp_interval()));

        let activity = Activity::default();
        let (health_tx, health_rx) = watch::channel(false);

        let worker = queue::spawn_worker(
            &runtime,
            rx,
            Reconciler::new(Arc::clone(&shared), config.enable_zone2),
            activity.clone(),
        );
        let poller = poll::spawn_poller(
            &runtime,
            PollSchedule {
                queries: protocol::status_queries(config.enable_zone2),
                period: config.poll_interval(),
                stagger: config.poll_stagger(),
            },
            sink.clone(),
            health_rx,
            Arc::clone(&shared),
        );

        Ok(Self {
            shared,
            sink,
            config: Arc::new(config),
            lines,
            health: Arc::new(health_tx),
            activity,
            main_ramp,
            channel_ramps: Arc::new(Mutex::new(HashMap::new())),
            zone2,
            tasks: Arc::new(Mutex::new(vec![worker, poller])),
        })
    }

    fn start_monitor(&self) {
        let task = monitor::spawn_monitor(
            &self.shared.runtime,
            self.config.monitor.clone(),
            self.sink.clone(),
            self.activity.clone(),
            Arc::clone(&self.health),
            self.shared.bus.clone(),
        );
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Stop background tasks and any running ramps
    pub fn shutdown(&self) {
        self.main_ramp.stop();
        for ramp in self
            .channel_ramps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            ramp.stop();
        }
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        tracing::info!("Receiver shut down");
    }

    // ========== Plumbing ==========

    /// Producer handle for received lines
    pub fn line_sender(&self) -> LineSender {
        self.lines.clone()
    }

    /// Report link health from an external monitor; polling runs only while healthy
    pub fn set_link_health(&self, healthy: bool) {
        self.health.send_if_modified(|current| {
            let changed = *current != healthy;
            *current = healthy;
            changed
        });
    }

    /// Whether the link is currently considered healthy
    pub fn is_link_healthy(&self) -> bool {
        *self.health.borrow()
    }

    /// Subscribe to value-changed notifications
    pub fn subscribe(&self) -> FeedbackReceiver {
        self.shared.bus.subscribe()
    }

    /// Send a raw command (the delimiter is appended)
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.sink.send(text)
    }

    /// Get the configuration this receiver was built with
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    // ========== State ==========

    /// Get a snapshot of the complete device state
    /// Values are read under one lock, so they are consistent with each other
    pub fn state_snapshot(&self) -> DeviceSnapshot {
        self.shared.lock().snapshot()
    }

    /// Get the confirmed power state
    pub fn power_is_on(&self) -> bool {
        self.shared.lock().power_is_on
    }

    /// Get the confirmed mute state
    pub fn mute_is_on(&self) -> bool {
        self.shared.lock().mute_is_on
    }

    /// Master volume in fine units
    pub fn volume_level(&self) -> Level {
        self.shared.lock().volume_level
    }

    /// Master volume on the 0..=65535 scale
    pub fn volume_normalized(&self) -> NormalizedLevel {
        let state = self.shared.lock();
        protocol::normalize(state.volume_level, 0, state.max_volume())
    }

    /// Get the effective master volume ceiling in fine units
    pub fn max_volume(&self) -> Level {
        self.shared.lock().max_volume()
    }

    /// Get the last input the device reported, known or not
    pub fn current_input(&self) -> Option<String> {
        self.shared.lock().current_input.clone()
    }

    /// Get the last surround mode the device reported
    pub fn current_surround_mode(&self) -> Option<SurroundMode> {
        self.shared.lock().current_surround_mode
    }

    /// Whether a power-on is still settling
    pub fn is_warming_up(&self) -> bool {
        self.shared.lock().transient.warming
    }

    /// Whether a power-off is still settling
    pub fn is_cooling_down(&self) -> bool {
        self.shared.lock().transient.cooling
    }

    /// Known inputs with their selection flags
    pub fn inputs(&self) -> Vec<SelectableItem<String>> {
        self.shared.lock().inputs.items().to_vec()
    }

    /// Known surround modes with their selection flags
    pub fn surround_modes(&self) -> Vec<SelectableItem<SurroundMode>> {
        self.shared.lock().surround_modes.items().to_vec()
    }

    /// Copy of the channels seen so far
    pub fn channels(&self) -> BTreeMap<SurroundChannel, ChannelVolume> {
        self.shared.lock().channels.snapshot()
    }

    /// Zone 2 controls, when enabled in the configuration
    pub fn zone2(&self) -> Option<&Zone2> {
        self.zone2.as_ref()
    }

    // ========== Power ==========

    /// Turn the receiver on and start the warm-up period
    pub fn power_on(&self) -> Result<()> {
        self.sink
            .send(protocol::power(true, self.config.use_zone_main_power))?;
        self.shared.begin_transient(Zone::Main, Phase::Warming);
        Ok(())
    }

    /// Put the receiver in standby and start the cool-down period
    pub fn power_off(&self) -> Result<()> {
        self.sink
            .send(protocol::power(false, self.config.use_zone_main_power))?;
        self.shared.begin_transient(Zone::Main, Phase::Cooling);
        Ok(())
    }

    /// Switch power based on the last confirmed state
    pub fn power_toggle(&self) -> Result<()> {
        if self.power_is_on() {
            self.power_off()
        } else {
            self.power_on()
        }
    }

    // ========== Mute ==========

    /// Mute the main zone
    pub fn mute_on(&self) -> Result<()> {
        self.sink.send(protocol::mute(true))
    }

    /// Unmute the main zone
    pub fn mute_off(&self) -> Result<()> {
        self.sink.send(protocol::mute(false))
    }

    /// Switch mute based on the last confirmed state
    pub fn mute_toggle(&self) -> Result<()> {
        if self.mute_is_on() {
            self.mute_off()
        } else {
            self.mute_on()
        }
    }

    // ========== Volume ==========

    /// Set master volume from a 0..=65535 control value
    pub fn set_volume(&self, value: NormalizedLevel) -> Result<()> {
        let (max, generation) = {
            let state = self.shared.lock();
            (state.max_volume(), state.generation)
        };
        let level = protocol::denormalize(value, 0, max, generation.step());
        self.sink.send(&protocol::master_volume(level, generation)?)
    }

    /// Set master volume in fine units
    pub fn set_volume_level(&self, level: Level) -> Result<()> {
        let (max, generation) = {
            let state = self.shared.lock();
            (state.max_volume(), state.generation)
        };
        if level > max {
            return Err(AvrError::OutOfRange {
                what: "master volume",
                value: level,
                min: 0,
                max,
            });
        }
        self.sink.send(&protocol::master_volume(level, generation)?)
    }

    /// Press (`true`) or release (`false`) volume up
    pub fn volume_up(&self, pressed: bool) {
        self.main_ramp.press(Direction::Up, pressed);
    }

    /// Press (`true`) or release (`false`) volume down
    pub fn volume_down(&self, pressed: bool) {
        self.main_ramp.press(Direction::Down, pressed);
    }

    /// Get the state of the master volume ramp
    pub fn volume_ramp_state(&self) -> RampState {
        self.main_ramp.state()
    }

    // ========== Sources ==========

    /// Select an input by key (e.g. `"BD"`, `"SAT/CBL"`)
    pub fn select_input(&self, key: &str) -> Result<()> {
        if !self.shared.lock().inputs.contains(&key.to_string()) {
            return Err(AvrError::UnknownInput(key.to_string()));
        }
        self.sink.send(&protocol::select_input(key))
    }

    /// Select a surround mode
    pub fn select_surround_mode(&self, mode: SurroundMode) -> Result<()> {
        self.sink.send(&protocol::select_surround_mode(mode)?)
    }

    /// Select a surround mode by key (e.g. `"DolbyDigital"`)
    pub fn select_surround_mode_by_key(&self, key: &str) -> Result<()> {
        self.select_surround_mode(key.parse()?)
    }

    // ========== Channels ==========

    /// Current entry for `channel`, registering it if it has not been seen
    pub fn channel_volume(&self, channel: SurroundChannel) -> Result<ChannelVolume> {
        if channel == SurroundChannel::Unknown {
            return Err(AvrError::UnknownChannel(channel.to_string()));
        }
        let cv = self.shared.mutate(|state, out| {
            let (cv, created) = state.channels.get_or_create(channel);
            if created {
                out.push(crate::feedback::Feedback::ChannelsChanged);
            }
            cv
        });
        Ok(cv)
    }

    /// Set a channel trim in fine units (380..=620, 500 = 0 dB)
    pub fn set_channel_volume(&self, channel: SurroundChannel, level: Level) -> Result<()> {
        let generation = self.shared.lock().generation;
        self.sink
            .send(&protocol::channel_volume(channel, level, generation)?)
    }

    /// Set a channel trim from a 0..=65535 control value
    pub fn set_channel_volume_normalized(
        &self,
        channel: SurroundChannel,
        value: NormalizedLevel,
    ) -> Result<()> {
        let generation = self.shared.lock().generation;
        let level = protocol::denormalize(value, CHANNEL_MIN, CHANNEL_MAX, generation.step());
        self.set_channel_volume(channel, level)
    }

    /// Press (`true`) or release (`false`) level up on one channel
    pub fn channel_volume_up(&self, channel: SurroundChannel, pressed: bool) -> Result<()> {
        self.channel_ramp(channel)?.press(Direction::Up, pressed);
        Ok(())
    }

    /// Press (`true`) or release (`false`) level down on one channel
    pub fn channel_volume_down(&self, channel: SurroundChannel, pressed: bool) -> Result<()> {
        self.channel_ramp(channel)?.press(Direction::Down, pressed);
        Ok(())
    }

    /// Return every channel to its default trim (one command for all)
    pub fn reset_channel_levels(&self) -> Result<()> {
        self.sink.send(protocol::CHANNEL_RESET)
    }

    fn channel_ramp(&self, channel: SurroundChannel) -> Result<Arc<RampCoordinator>> {
        if channel == SurroundChannel::Unknown {
            return Err(AvrError::UnknownChannel(channel.to_string()));
        }
        let mut ramps = self
            .channel_ramps
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let ramp = ramps.entry(channel).or_insert_with(|| {
            Arc::new(RampCoordinator::new(
                "channel volume",
                Arc::new(ChannelVolumeTarget {
                    channel,
                    shared: Arc::clone(&self.shared),
                    sink: self.sink.clone(),
                }),
                self.config.generation.step(),
                self.config.ramp_interval(),
                self.shared.runtime.clone(),
            ))
        });
        Ok(Arc::clone(ramp))
    }
}
