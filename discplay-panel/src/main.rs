use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use discplay_core::clock::SystemClock;
use discplay_core::commands::Gesture;
use discplay_core::devices::{AudioOutputs, DiscListener, DisplaySink};
use discplay_core::display::RefreshLoop;
use discplay_core::input::{ButtonPoller, GestureSubscriber, InputDisambiguator, TimerScheduler};
use discplay_core::markers::MarkerFile;
use discplay_core::{MenuStateMachine, PlaybackController};

mod config;
mod disc;
mod dispatch;
mod hardware;
mod logger;

use config::PanelConfig;
use disc::{CdparanoiaProbe, DiscWatcher};
use dispatch::{GestureDispatcher, SharedMenu, with_menu};
use hardware::{BluetoothCtl, ConsoleLcd, SystemAudio, SysfsPins};

/// Everything with a thread behind it, in the order it is torn down.
struct Panel {
    poller: RefreshLoop,
    disc_watch: RefreshLoop,
    dispatcher: GestureDispatcher,
    menu_tick: RefreshLoop,
    menu: SharedMenu,
    controller: PlaybackController,
    _scheduler: Arc<TimerScheduler>,
}

impl Panel {
    fn start(config: PanelConfig) -> Result<Self> {
        let player = &config.player;
        let display = Arc::new(ConsoleLcd::new());
        display.show_status("CD Player Ready", "Insert CD...");

        MarkerFile::new(player.track_marker.clone()).store(1);

        let outputs = Arc::new(SystemAudio::new(
            config.audio_user.clone(),
            player.decoder.env.clone(),
            MarkerFile::new(player.output_marker.clone()),
        ));
        outputs.restore_last_device();

        let probe = Arc::new(CdparanoiaProbe::new(
            player.decoder.cdrom_device.clone(),
            player.disc.placeholder_track_length,
        ));
        let controller = PlaybackController::builder(player.clone(), outputs.clone(), display.clone())
            .track_probe(probe)
            .build()
            .context("start playback controller")?;
        outputs.subscribe(Arc::new(controller.clone()))?;

        let menu: SharedMenu = Arc::new(Mutex::new(MenuStateMachine::new(
            player.menu.clone(),
            Arc::new(SystemClock),
            Arc::new(controller.clone()),
            outputs,
            Arc::new(BluetoothCtl::new(config.bluetooth_scan)),
            display,
            controller.screen(),
        )));

        let (gesture_tx, gesture_rx) = crossbeam_channel::unbounded::<Gesture>();
        let subscriber: Arc<dyn GestureSubscriber> = Arc::new(gesture_tx);
        let scheduler = Arc::new(TimerScheduler::spawn(subscriber.clone()).context("start click timer")?);
        let dispatcher = GestureDispatcher::spawn(gesture_rx, menu.clone()).context("start dispatcher")?;

        let menu_tick = {
            let menu = menu.clone();
            RefreshLoop::spawn("menu-timeout", config.menu_tick, move || {
                with_menu(&menu, |menu| {
                    menu.check_timeout();
                });
            })
            .context("start menu timeout loop")?
        };

        let pins = SysfsPins::open(&config.gpio_root, &player.input).context("open button pins")?;
        let disambiguator = InputDisambiguator::new(&player.input, scheduler.clone(), subscriber);
        let poller = ButtonPoller::new(Box::new(pins), disambiguator, Arc::new(SystemClock))
            .spawn(&player.input)
            .context("start button polling")?;

        let listener: Arc<dyn DiscListener> = Arc::new(controller.clone());
        let disc_watch = DiscWatcher::new(config.disc_size_file.clone(), listener)
            .spawn(config.disc_poll)
            .context("start disc watcher")?;

        log::info!("Front panel ready");
        Ok(Self {
            poller,
            disc_watch,
            dispatcher,
            menu_tick,
            menu,
            controller,
            _scheduler: scheduler,
        })
    }

    fn shutdown(self) {
        log::info!("Shutting down front panel");
        self.poller.stop();
        self.disc_watch.stop();
        self.dispatcher.stop();
        self.menu_tick.stop();
        with_menu(&self.menu, |menu| menu.close());
        self.controller.shutdown();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("wait for Ctrl-C")?,
        _ = terminate.recv() => log::info!("SIGTERM received"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::setup_logging();
    log::info!("Starting discplay");

    let config = PanelConfig::from_env()?;
    let panel = tokio::task::spawn_blocking(move || Panel::start(config)).await??;

    wait_for_signal().await?;

    tokio::task::spawn_blocking(move || panel.shutdown()).await?;
    log::info!("Goodbye");
    Ok(())
}
