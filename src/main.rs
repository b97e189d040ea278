//! Cam-controller binary for exercising a camera from the command line.

use std::path::PathBuf;

use cam_controller::{
    CameraController, CaptureBackend, ControllerConfig, DeviceOrientation, PrimaryUse,
    V4L2Backend, VideoQuality,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cam-controller")]
#[command(author, version, about = "Camera capture controller", long_about = None)]
struct Cli {
    /// Directory output files are written to (defaults to the temp directory)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Capture buffers requested from the driver
    #[arg(long, default_value = "4")]
    buffers: u32,

    /// JPEG quality, 1-100
    #[arg(long, default_value = "90")]
    jpeg_quality: u8,

    /// Use the front camera
    #[arg(long)]
    front: bool,

    /// Device orientation
    #[arg(long, value_enum, default_value = "landscape")]
    orientation: OrientationArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List camera devices
    List,
    /// Negotiate formats and take one photo
    Photo,
    /// Negotiate formats for video and record until Enter is pressed
    Record {
        /// Quality tier
        #[arg(long, value_enum, default_value = "hd720p")]
        quality: QualityArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OrientationArg {
    Landscape,
    Portrait,
    LandscapeFlipped,
    PortraitFlipped,
}

impl From<OrientationArg> for DeviceOrientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Landscape => Self::Landscape,
            OrientationArg::Portrait => Self::Portrait,
            OrientationArg::LandscapeFlipped => Self::LandscapeFlipped,
            OrientationArg::PortraitFlipped => Self::PortraitFlipped,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    Hd1080p,
    Hd720p,
    Wvga,
    Ntsc,
    Pal,
    Vga,
    Qvga,
}

impl From<QualityArg> for VideoQuality {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Hd1080p => Self::Hd1080p,
            QualityArg::Hd720p => Self::Hd720p,
            QualityArg::Wvga => Self::Wvga,
            QualityArg::Ntsc => Self::Ntsc,
            QualityArg::Pal => Self::Pal,
            QualityArg::Vga => Self::Vga,
            QualityArg::Qvga => Self::Qvga,
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> cam_controller::Result<()> {
    let mut config = ControllerConfig::default()
        .with_buffer_count(cli.buffers)
        .with_jpeg_quality(cli.jpeg_quality)
        .with_initial_orientation(cli.orientation.into());
    if let Some(dir) = cli.output_dir {
        config = config.with_output_dir(dir);
    }

    let backend = V4L2Backend::new(config.buffer_count);

    match cli.command {
        Commands::List => {
            for device in backend.enumerate_devices()? {
                println!("{}: {} ({:?})", device.id, device.name, device.panel);
            }
        }
        Commands::Photo => {
            let mut controller = open(
                backend,
                config,
                cli.front,
                PrimaryUse::Photo,
                VideoQuality::default(),
            )?;
            if let Some(selection) = controller.encoding_selection() {
                println!("Photo: {}x{}", selection.image.width, selection.image.height);
            }
            match controller.capture_photo() {
                Some(path) => println!("Saved {}", path.display()),
                None => println!("No photo taken"),
            }
        }
        Commands::Record { quality } => {
            let mut controller =
                open(backend, config, cli.front, PrimaryUse::Video, quality.into())?;
            let path = controller.start_video_recording()?;
            println!("Recording to {} - press Enter to stop", path.display());
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            controller.stop_video_recording()?;
        }
    }
    Ok(())
}

fn open(
    backend: V4L2Backend,
    config: ControllerConfig,
    front: bool,
    primary_use: PrimaryUse,
    quality: VideoQuality,
) -> cam_controller::Result<CameraController<V4L2Backend>> {
    let mut controller = CameraController::new(backend, config);
    if front {
        controller.change_camera(primary_use, quality)?;
    } else {
        controller.initialize(primary_use, quality)?;
    }
    println!(
        "Camera: {} (front-facing available: {})",
        controller.active_camera(),
        controller.is_front_facing_available()
    );
    Ok(controller)
}
