//! # Weather Station Application Entry Point
//!
//! Wires the configured data sources, panels and display driver into the
//! render loop and runs it forever.
//!
//! ## Flags
//! - `--config <path>`: config file (default `weather-station.toml`)
//! - `--virtual`: no sensor hardware; a fixed reading stands in for the BME680
//! - `--stdout`: print an ASCII preview of the panel on every full refresh
//! - `--debug`: debug logging (`RUST_LOG` still wins)
//! - `--init-config`: write the default configuration and exit

use anyhow::{bail, Context};
use env_logger::Env;
use log::{info, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use weather_station_lib::{
    climacell::ClimacellFetcher,
    compositor::DisplayCompositor,
    config::{Config, WeatherProvider, DEFAULT_CONFIG_FILE},
    display::VirtualDisplay,
    fetch::Fetcher,
    icons::OutlineIcons,
    layout::Layout,
    main_loop::MainLoop,
    panels::{ForecastPanel, SensorPanel, ThermostatPanel},
    scheduler::RefreshScheduler,
    sensor::{IioSensor, SensorDriver, SensorFetcher, StaticSensor},
    source::ErrorDisplay,
    tado::TadoFetcher,
    yr::YrFetcher,
};

/// Columns of the `--stdout` preview
const ASCII_COLUMNS: u32 = 100;

/// Command line flags
struct Args {
    /// `None` means the default file
    config_path: Option<PathBuf>,
    virtual_mode: bool,
    stdout: bool,
    debug: bool,
    init_config: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = Args {
            config_path: None,
            virtual_mode: false,
            stdout: false,
            debug: false,
            init_config: false,
        };

        let mut iter = env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    let path = iter.next().context("--config needs a path")?;
                    args.config_path = Some(PathBuf::from(path));
                }
                "--virtual" => args.virtual_mode = true,
                "--stdout" => args.stdout = true,
                "--debug" => args.debug = true,
                "--init-config" => args.init_config = true,
                other => bail!("unknown argument `{other}`"),
            }
        }
        Ok(args)
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let args = Args::parse()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(if args.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp_secs()
    .init();

    info!(
        "{} v{} starting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    if args.init_config {
        let defaults = Config::default();
        let written = match &args.config_path {
            Some(path) => defaults.save_to_path(path),
            None => defaults.save(),
        };
        let target = args
            .config_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        written
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("writing {}", target.display()))?;
        return Ok(());
    }

    let config = match &args.config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    config.validate().context("invalid configuration")?;

    // Local time follows TZ; set it before any thread exists
    if env::var_os("TZ").is_none() {
        env::set_var("TZ", &config.location.time_zone);
        info!("Using time zone {}", config.location.time_zone);
    }

    let runtime = Runtime::new().context("starting the fetch runtime")?;
    let handle = runtime.handle().clone();

    let mut scheduler = RefreshScheduler::new(handle.clone(), config.display.error_wrap_width);

    let sensor: Box<dyn SensorDriver> = if args.virtual_mode {
        info!("Virtual mode: using a fixed sensor reading");
        Box::new(StaticSensor::default())
    } else {
        Box::new(IioSensor::new(&config.sensor.iio_device))
    };
    // A missed reading keeps the last one on screen
    let sensor_id = scheduler.register_with(
        "bme680",
        config.refresh.sensor(),
        ErrorDisplay::LogOnly,
        Arc::new(SensorFetcher::new(sensor, config.sensor.temperature_offset)),
    );

    let weather: Arc<dyn Fetcher> = match config.weather.provider {
        WeatherProvider::Yr => {
            Arc::new(YrFetcher::new(handle.clone(), &config).context("yr.no client")?)
        }
        WeatherProvider::Climacell => {
            let key = config
                .weather
                .climacell_api_key
                .clone()
                .context("climacell_api_key is not set")?;
            let client =
                ClimacellFetcher::new(handle.clone(), &config, key).context("Climacell client")?;
            Arc::new(client)
        }
    };
    let weather_name = match config.weather.provider {
        WeatherProvider::Yr => "yr.no",
        WeatherProvider::Climacell => "climacell",
    };
    let weather_id = scheduler.register(weather_name, config.refresh.weather(), weather);

    let thermostat_id = if config.thermostat.enabled {
        let tado = TadoFetcher::new(handle.clone(), &config).context("Tado client")?;
        Some(scheduler.register("tado", config.refresh.thermostat(), Arc::new(tado)))
    } else {
        info!("Thermostat disabled");
        None
    };

    let (width, height) = (config.display.width, config.display.height);
    let mut compositor = DisplayCompositor::new(
        width,
        height,
        config.refresh.full_refresh(),
        config.display.full_mode,
        config.display.partial_mode,
    );
    Layout::for_panel(width, height)
        .claim_all(&mut compositor)
        .context("laying out the panel")?;

    // No panel controller driver is built in; the virtual display stands in
    if !args.virtual_mode {
        warn!("No e-paper driver available, using the virtual display");
    }
    let mut display = VirtualDisplay::new(width, height);
    if let Some(path) = &config.display.snapshot_path {
        display = display.with_snapshot(path);
    }
    if args.stdout {
        display = display.with_ascii_preview(ASCII_COLUMNS);
    }

    let mut main_loop = MainLoop::new(scheduler, compositor, display, config.refresh.tick());
    main_loop.attach(sensor_id, Box::new(SensorPanel));
    main_loop.attach(
        weather_id,
        Box::new(ForecastPanel::new(
            config.location.latitude,
            config.location.longitude,
            Box::new(OutlineIcons),
        )),
    );
    if let Some(id) = thermostat_id {
        main_loop.attach(id, Box::new(ThermostatPanel::default()));
    }

    main_loop.start(weather_station_lib::now());
    main_loop.run()
}
