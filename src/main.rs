use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use gfxreplay::{
    capture::{CaptureReader, CaptureWriter},
    config::Config,
    context::Ctx,
    device::{DeviceInstance, GlVersion},
    replay::{Action, ActionId, ActionSink, ActionStatus, Manager, Query, ReplayError, ReplayInput, ReplayWorker},
    rpc::{run_server, AppState, RpcClient},
    stash::Stash,
    transform::{Pass, Transform, TransformSpec},
    AtomId,
};

#[derive(Parser, Debug)]
#[command(name = "gfxreplay", version, about = "Rewrite and replay captured graphics command streams")]
struct Cli {
    /// Data directory (defaults to ~/.gfxreplay).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log to stderr instead of the log file.
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the replay manager and stash over HTTP.
    Serve(ServeArgs),
    /// Run a transform pass over a capture file.
    Transform(TransformArgs),
    /// Execute replays for a remote server as a device.
    Device(DeviceArgs),
    /// Upload a capture and submit a replay action.
    Do(DoArgs),
    /// List actions known to a server.
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Do not run replays for this machine in-process.
    #[arg(long)]
    no_local_device: bool,
}

#[derive(Args, Debug, Clone)]
struct TransformFlags {
    /// Paint a pattern wherever frame buffer content is undefined.
    #[arg(long)]
    undefined_framebuffer: bool,

    /// Drop everything after this atom.
    #[arg(long, value_name = "ATOM")]
    stop_after: Option<u64>,
}

impl TransformFlags {
    fn specs(&self) -> Vec<TransformSpec> {
        let mut specs = Vec::new();
        if self.undefined_framebuffer {
            specs.push(TransformSpec::UndefinedFramebuffer);
        }
        if let Some(last) = self.stop_after {
            specs.push(TransformSpec::EarlyTerminator { last: AtomId(last) });
        }
        specs
    }
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// Capture to read.
    input: PathBuf,

    /// Where to write the rewritten capture.
    output: PathBuf,

    #[command(flatten)]
    transforms: TransformFlags,

    /// GL version of the replay device (overrides config).
    #[arg(long)]
    gl_version: Option<GlVersion>,
}

#[derive(Args, Debug)]
struct ServerArg {
    /// Server URL (defaults to the configured rpc address).
    #[arg(long)]
    server: Option<String>,
}

#[derive(Args, Debug)]
struct DeviceArgs {
    #[command(flatten)]
    server: ServerArg,

    /// Device name to register as (overrides config).
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct DoArgs {
    #[command(flatten)]
    server: ServerArg,

    /// Target device.
    #[arg(long)]
    device: String,

    /// Capture file to replay.
    #[arg(long)]
    capture: PathBuf,

    #[command(flatten)]
    transforms: TransformFlags,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[command(flatten)]
    server: ServerArg,

    #[arg(long)]
    id: Option<String>,

    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    status: Option<ActionStatus>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.data_dir.clone());
    init_logging(&config, cli.log_stderr)?;

    let ctx = Ctx::new("cli");
    match cli.cmd {
        Command::Serve(args) => cmd_serve(&ctx, config, args).await,
        Command::Transform(args) => cmd_transform(&ctx, &config, args).await,
        Command::Device(args) => cmd_device(&ctx, &config, args).await,
        Command::Do(args) => cmd_do(&ctx, &config, args).await,
        Command::Search(args) => cmd_search(&ctx, &config, args).await,
    }
}

fn init_logging(config: &Config, log_stderr: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if log_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    // Log to file (<data_dir>/logs/gfxreplay.log)
    fs::create_dir_all(config.logs_dir())?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

fn server_url(config: &Config, arg: &ServerArg) -> String {
    arg.server.clone().unwrap_or_else(|| config.rpc.base_url())
}

async fn cmd_serve(ctx: &Ctx, config: Config, args: ServeArgs) -> Result<()> {
    let config = match args.port {
        Some(port) => config.with_port(port),
        None => config,
    };
    let state = AppState::open(ctx, config).await?;
    if !args.no_local_device {
        state.register_local_worker(ctx).await?;
    }
    println!("Listening on {}", state.config().rpc.base_url());
    run_server(state).await
}

async fn cmd_transform(ctx: &Ctx, config: &Config, args: TransformArgs) -> Result<()> {
    let gl_version = args.gl_version.unwrap_or(config.device.gl_version);
    let device = DeviceInstance::new("local", gl_version);
    let transforms: Vec<Box<dyn Transform>> = args
        .transforms
        .specs()
        .iter()
        .map(|spec| spec.build(&device))
        .collect();
    let limits = config.pipeline;
    let pass_ctx = ctx.child("pass");

    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let reader = CaptureReader::open(&args.input, limits.max_frame_size)
            .with_context(|| format!("open capture '{}'", args.input.display()))?;
        let mut writer = CaptureWriter::create(&args.output, limits.max_frame_size)
            .with_context(|| format!("create '{}'", args.output.display()))?;
        let outcome = Pass::new(transforms)
            .with_max_probes(limits.max_allocation_probes)
            .try_run(&pass_ctx, reader, &mut writer)?;
        writer.finish()?;
        Ok(outcome)
    })
    .await??;

    println!("{} atoms in, {} atoms out", outcome.consumed, outcome.emitted);
    Ok(())
}

async fn cmd_device(ctx: &Ctx, config: &Config, args: DeviceArgs) -> Result<()> {
    let client = Arc::new(RpcClient::new(server_url(config, &args.server)));
    let mut device = config.device.instance();
    if let Some(name) = args.name {
        device = DeviceInstance::new(name, device.gl_version);
    }
    let worker = ReplayWorker::new(
        &client,
        Arc::new(client.stash()),
        device.clone(),
        config.pipeline,
    );

    println!("Serving replays as {} for {}", device.id, client.base_url());
    client
        .serve_device(ctx, device.clone(), device, Arc::new(worker))
        .await?;
    Ok(())
}

async fn cmd_do(ctx: &Ctx, config: &Config, args: DoArgs) -> Result<()> {
    let client = RpcClient::new(server_url(config, &args.server));
    let bytes = fs::read(&args.capture)
        .with_context(|| format!("read capture '{}'", args.capture.display()))?;
    let capture = client.stash().put(ctx, bytes).await?;
    let id: ActionId = client
        .do_action(
            ctx,
            &args.device,
            ReplayInput {
                capture,
                transforms: args.transforms.specs(),
            },
        )
        .await?;
    println!("{id}");
    Ok(())
}

/// Prints each action as one JSON line.
struct Printer;

#[async_trait::async_trait]
impl ActionSink for Printer {
    async fn accept(&mut self, _ctx: &Ctx, action: Action) -> Result<(), ReplayError> {
        match serde_json::to_string(&action) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(action = %action.id, error = %e, "unprintable action"),
        }
        Ok(())
    }
}

async fn cmd_search(ctx: &Ctx, config: &Config, args: SearchArgs) -> Result<()> {
    let client = RpcClient::new(server_url(config, &args.server));
    let query = Query {
        id: args.id.map(ActionId::from),
        device: args.device,
        status: args.status,
    };
    client.search(ctx, &query, &mut Printer).await?;
    Ok(())
}
