use clap::Parser;
use einkrfb::cli::Args;
use einkrfb::clock::SystemClock;
use einkrfb::config::AppConfig;
use einkrfb::device::{self, InputNodes, Profile};
use einkrfb::error::CoreError;
use einkrfb::eventloop::{ButtonsConfig, EventLoop, PenConfig, TouchConfig};
use einkrfb::input::EventReader;
use einkrfb::net::TcpRfbSession;
use einkrfb::panel::mxcfb::MxcfbPanel;
use einkrfb::panel::queue::QueuePanel;
use einkrfb::panel::Panel;
use einkrfb::repaint::Scheduler;
use std::ffi::CString;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("einkrfb: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();
}

fn run(args: &Args) -> Result<(), CoreError> {
    let config = AppConfig::from_args(args).map_err(|e| CoreError::ProtocolInit(e.to_string()))?;

    let profile = device::detect().map_err(CoreError::from)?;
    log::info!("detected hardware profile: {profile:?}");

    let geometry = profile.screen_geometry();
    let mut panel: Box<dyn Panel> = open_panel(profile, geometry)?;

    let session = TcpRfbSession::connect(
        &config.host,
        config.port,
        geometry.format,
        geometry,
        panel.framebuffer(),
    )?;
    log::info!("connected to {}:{}", config.host, config.port);

    let scheduler = Scheduler::new(panel, SystemClock, geometry.xres, geometry.yres);

    let nodes = probe_nodes_for(&config)?;

    let touch = nodes
        .touch
        .filter(|_| config.enable_touch)
        .map(|path| -> Result<TouchConfig, CoreError> {
            Ok(TouchConfig {
                reader: EventReader::open(&path, "touch")?,
                flip: profile.touch_flip(),
            })
        })
        .transpose()?;

    let pen = nodes
        .pen
        .filter(|_| config.enable_pen)
        .map(|path| -> Result<PenConfig, CoreError> {
            Ok(PenConfig {
                reader: EventReader::open(&path, "pen")?,
            })
        })
        .transpose()?;

    let buttons = nodes
        .buttons
        .filter(|_| config.enable_buttons)
        .map(|path| -> Result<ButtonsConfig, CoreError> {
            Ok(ButtonsConfig {
                reader: EventReader::open(&path, "buttons")?,
            })
        })
        .transpose()?;

    let mut event_loop = EventLoop::new(Box::new(session), scheduler, touch, pen, buttons)?;
    event_loop.run()
}

fn probe_nodes_for(config: &AppConfig) -> Result<InputNodes, CoreError> {
    if !config.enable_touch && !config.enable_pen && !config.enable_buttons {
        return Ok(InputNodes::default());
    }
    device::probe_input_nodes(Path::new("/dev/input"))
}

fn open_panel(profile: Profile, geometry: einkrfb::geometry::ScreenGeometry) -> Result<Box<dyn Panel>, CoreError> {
    match profile {
        Profile::MxcfbDirect => {
            let panel = MxcfbPanel::open(profile.panel_path(), geometry)?;
            Ok(Box::new(panel))
        }
        Profile::SharedQueue => {
            let shm_path = profile.panel_path();
            let queue_key = ftok_key(shm_path)?;
            let panel = QueuePanel::open(shm_path, queue_key, geometry)?;
            Ok(Box::new(panel))
        }
    }
}

fn ftok_key(path: &Path) -> Result<libc::key_t, CoreError> {
    let c_path = CString::new(path.as_os_str().to_string_lossy().as_bytes()).map_err(|e| {
        CoreError::DeviceOpen {
            device: "panel",
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        }
    })?;
    // Safety: c_path is a valid, nul-terminated C string for the duration of the call.
    let key = unsafe { libc::ftok(c_path.as_ptr(), 1) };
    if key == -1 {
        return Err(CoreError::DeviceOpen {
            device: "panel",
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(key)
}
