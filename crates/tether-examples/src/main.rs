use facet::Facet;
use figue as args;

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Print the registry as JSON instead of text profiles.
    #[facet(args::named, default)]
    json: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    Unreleased,
    Released,
    ConcurrentRelease {
        #[facet(args::named, default)]
        threads: Option<u32>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Leaks are expected here; log them instead of taking the process down.
    let _reporter = tether::set_reporter(tether::LogReporter);

    match cli.command {
        CommandKind::Unreleased => scenarios::unreleased::run()?,
        CommandKind::Released => scenarios::released::run()?,
        CommandKind::ConcurrentRelease { threads } => {
            scenarios::concurrent_release::run(threads.unwrap_or(8) as usize)?
        }
    }

    scenarios::dump_registry(cli.json)
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("tether-examples")
                .description("Run tether leak-tracking scenarios as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}
