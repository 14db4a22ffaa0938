use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use renderer::{CanvasSize, CHANNEL_COUNT};

#[derive(Parser, Debug)]
#[command(
    name = "shadebox",
    author,
    version,
    about = "Live WGSL shader preview"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// WGSL shader file to preview.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Preview manifest (TOML) supplying shader, textures, mesh and window settings.
    #[arg(long, value_name = "PATH", env = "SHADEBOX_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Bind an image to a texture channel, e.g. `--channel 0=noise.png`. Repeatable.
    #[arg(long = "channel", value_name = "INDEX=IMAGE", value_parser = parse_channel)]
    pub channels: Vec<(usize, PathBuf)>,

    /// OBJ mesh to draw instead of the fullscreen triangle.
    #[arg(long, value_name = "OBJ")]
    pub mesh: Option<PathBuf>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<CanvasSize>,

    /// Window title.
    #[arg(long)]
    pub title: Option<String>,

    /// Reload the shader whenever the file changes on disk.
    #[arg(long)]
    pub watch: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify and validate a shader without opening a window.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// WGSL shader file to check.
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<CanvasSize, String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, e.g. 1280x720 (got '{trimmed}')"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height.trim()))?;

    let size = CanvasSize::new(width, height);
    if size.is_empty() {
        return Err("window dimensions must be greater than zero".to_string());
    }
    Ok(size)
}

pub fn parse_channel(value: &str) -> Result<(usize, PathBuf), String> {
    let (index, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=IMAGE, e.g. 0=noise.png (got '{value}')"))?;

    let index: usize = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid channel index '{}'", index.trim()))?;
    if index >= CHANNEL_COUNT {
        return Err(format!(
            "channel {index} is out of range; expected 0-{}",
            CHANNEL_COUNT - 1
        ));
    }

    let path = path.trim();
    if path.is_empty() {
        return Err(format!("channel {index} needs an image path"));
    }
    Ok((index, PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_specifications() {
        assert_eq!(parse_size("1280x720"), Ok(CanvasSize::new(1280, 720)));
        assert_eq!(parse_size(" 640 X 480 "), Ok(CanvasSize::new(640, 480)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("widex720").is_err());
    }

    #[test]
    fn parses_channel_assignments() {
        assert_eq!(
            parse_channel("2=textures/wood.png"),
            Ok((2, PathBuf::from("textures/wood.png")))
        );
        assert!(parse_channel("4=extra.png").is_err());
        assert!(parse_channel("noise.png").is_err());
        assert!(parse_channel("1=").is_err());
    }

    #[test]
    fn check_subcommand_takes_precedence() {
        let cli = Cli::try_parse_from(["shadebox", "check", "demo.wgsl", "--format", "json"])
            .expect("parse check");
        match cli.command {
            Some(Command::Check(args)) => {
                assert_eq!(args.shader, PathBuf::from("demo.wgsl"));
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("expected check command, got {other:?}"),
        }
    }

    #[test]
    fn run_args_collect_repeated_channels() {
        let cli = Cli::try_parse_from([
            "shadebox",
            "demo.wgsl",
            "--channel",
            "0=a.png",
            "--channel",
            "3=b.png",
            "--size",
            "800x600",
            "--watch",
        ])
        .expect("parse run args");
        assert!(cli.command.is_none());
        assert_eq!(cli.run.shader, Some(PathBuf::from("demo.wgsl")));
        assert_eq!(
            cli.run.channels,
            vec![(0, PathBuf::from("a.png")), (3, PathBuf::from("b.png"))]
        );
        assert_eq!(cli.run.size, Some(CanvasSize::new(800, 600)));
        assert!(cli.run.watch);
    }
}
