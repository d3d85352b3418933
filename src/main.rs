use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zine::api::{ApiResponse, ContentApi};
use zine::config::{load_config, Config, RenderConfig, MAX_FRAMES};
use zine::dither::clock::FrameClock;
use zine::dither::{Backend, CellSize, DitherRenderer, RendererOptions, SourceState};

#[derive(Debug, Parser)]
#[command(name = "zine")]
#[command(about = "Dither images and manage zine site content")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ZINE_GIT_HASH"), ")"))]
struct Cli {
    /// Debug logging unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dither an image (path or URL) into numbered PNG frames.
    Render {
        image: String,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        overrides: RenderOverrides,
    },
    /// Validate a config file and print the resolved render settings.
    Check { config: PathBuf },
    #[command(subcommand)]
    Content(ContentCommand),
    #[command(subcommand)]
    Media(MediaCommand),
}

#[derive(Debug, Args)]
struct RenderOverrides {
    #[arg(long)]
    threshold: Option<f32>,
    #[arg(long)]
    contrast: Option<f32>,
    #[arg(long)]
    grain: Option<f32>,
    #[arg(long = "cell-size")]
    cell_size: Option<u32>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    frames: Option<u32>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    gpu: bool,
}

#[derive(Debug, Args)]
struct SiteArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Password to log in with. Checked against the server's ADMIN_PASSWORD.
    #[arg(long, env = "ZINE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ContentCommand {
    /// Print a section document.
    Get {
        section: String,
        #[command(flatten)]
        site: SiteArgs,
    },
    /// Replace a section document with the contents of a JSON file.
    Put {
        section: String,
        file: PathBuf,
        #[command(flatten)]
        site: SiteArgs,
    },
}

#[derive(Debug, Subcommand)]
enum MediaCommand {
    /// Upload an image or video and print its public URL.
    Upload {
        file: PathBuf,
        #[arg(long)]
        mime: Option<String>,
        #[command(flatten)]
        site: SiteArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Render {
            image,
            output,
            config,
            overrides,
        } => run_render(&image, &output, config.as_deref(), &overrides),
        Commands::Check { config } => run_check(&config),
        Commands::Content(ContentCommand::Get { section, site }) => {
            let api = open_api(&site)?;
            emit(&api.get_content(&section))
        }
        Commands::Content(ContentCommand::Put {
            section,
            file,
            site,
        }) => {
            let body =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let api = open_api(&site)?;
            let authorization = login(&api, &site)?;
            emit(&api.put_content(&authorization, &section, &body))
        }
        Commands::Media(MediaCommand::Upload { file, mime, site }) => {
            let bytes =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .and_then(|name| name.to_str())
                .context("upload path has no file name")?;
            let api = open_api(&site)?;
            let authorization = login(&api, &site)?;
            emit(&api.upload(&authorization, name, mime.as_deref(), &bytes))
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "zine=debug" } else { "zine=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

fn apply_overrides(render: &mut RenderConfig, overrides: &RenderOverrides) -> Result<()> {
    let dither = &mut render.dither;
    if let Some(threshold) = overrides.threshold {
        dither.threshold = threshold;
    }
    if let Some(contrast) = overrides.contrast {
        dither.contrast = contrast;
    }
    if let Some(grain) = overrides.grain {
        dither.grain = grain;
    }
    if let Some(cell_size) = overrides.cell_size {
        dither.cell_size = CellSize::from_raw(cell_size);
    }
    if let Some(width) = overrides.width {
        render.width = width;
    }
    if let Some(height) = overrides.height {
        render.height = height;
    }
    if let Some(frames) = overrides.frames {
        render.frames = frames;
    }
    if let Some(fps) = overrides.fps {
        render.fps = fps;
    }
    if let Some(background) = &overrides.background {
        render.background = Some(background.clone());
    }
    if overrides.gpu {
        render.backend = Backend::Gpu;
    }
    render.validate().context("invalid render settings")
}

fn run_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let render = &config.render;
    let dither = &render.dither;

    println!(
        "OK: {} ({}x{}, {} fps, {} frames, {:?})",
        config_path.display(),
        render.width,
        render.height,
        render.fps,
        render.frames,
        render.backend
    );
    println!(
        "Dither: threshold {} contrast {} grain {} cell {} ({:?})",
        dither.threshold,
        dither.contrast,
        dither.grain,
        dither.cell_size.side(),
        dither.normalization
    );
    println!("Site: {:?}", config.site.mode);
    Ok(())
}

fn run_render(
    image: &str,
    output_dir: &Path,
    config_path: Option<&Path>,
    overrides: &RenderOverrides,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config.render, overrides)?;
    let render = &config.render;

    let options = RendererOptions {
        params: render.dither,
        box_width: render.width,
        box_height: render.height,
        background: render.background_rgba()?,
        backend: render.backend,
        label: render.label.clone(),
    };
    let mut renderer = DitherRenderer::with_source(options, image);
    match renderer.wait_for_source() {
        SourceState::Ready(_) => {}
        SourceState::Failed(reason) => bail!("failed to load image {image}: {reason}"),
        SourceState::Pending => bail!("image {image} never finished loading"),
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let total = render.frames.min(MAX_FRAMES);
    for index in 0..total {
        let elapsed = FrameClock::time_for_frame(index, render.fps);
        let Some(frame) = renderer.draw(elapsed) else {
            bail!("frame {index} could not be rendered");
        };
        let path = output_dir.join(format!("frame_{index:05}.png"));
        frame
            .image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        if index % render.fps == 0 {
            tracing::info!(frame = index + 1, total, "rendered frame");
        }
    }
    renderer.dispose();

    println!("Wrote {} frame(s) to {}", total, output_dir.display());
    Ok(())
}

fn open_api(args: &SiteArgs) -> Result<ContentApi> {
    let mut config = resolve_config(args.config.as_deref())?;
    config
        .site
        .apply_env(|key| std::env::var(key).ok())
        .context("invalid environment")?;
    ContentApi::from_site_config(&config.site)
}

fn login(api: &ContentApi, args: &SiteArgs) -> Result<String> {
    let Some(password) = args.password.as_deref() else {
        bail!("a password is required (--password or ZINE_PASSWORD)");
    };
    let body = serde_json::to_vec(&serde_json::json!({ "password": password }))?;
    let response = api.login(&body);
    if !response.is_success() {
        emit(&response)?;
    }
    let token = response.body["token"]
        .as_str()
        .context("login response has no token")?;
    Ok(format!("Bearer {token}"))
}

/// Print a response body; non-2xx responses go to stderr and fail the command.
fn emit(response: &ApiResponse) -> Result<()> {
    let text = serde_json::to_string_pretty(&response.body)?;
    if response.is_success() {
        println!("{text}");
        Ok(())
    } else {
        eprintln!("{text}");
        bail!("request failed with status {}", response.status)
    }
}
