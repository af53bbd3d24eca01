use clap::{Parser, Subcommand};
use rts_site::{config, imaging, links, output, pipeline, server};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Shared flags for commands that use the build cache.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the build cache: re-minify and rewrite every file
    #[arg(long)]
    no_cache: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "rts-site")]
#[command(about = "Server and build tooling for the Return to the Source site")]
#[command(long_about = "\
Server and build tooling for the Return to the Source site

Project layout:

  ./
  ├── config.toml                  # Optional overrides (see gen-config)
  ├── src/frontend/                # Site sources, served in development
  │   ├── css/ js/ img/ resources/
  │   ├── index.html ...
  │   └── editions/ portfolios/
  └── dist/                        # Production build output

Typical flow:

  rts-site convert-images          # Add .webp siblings for new photos
  rts-site build                   # Minify into dist/
  rts-site check-links             # Verify dist/ links
  rts-site serve                   # http://localhost:5000

Logging is controlled with RUST_LOG (default: rts_site=info).")]
#[command(version = version_string())]
struct Cli {
    /// Project root containing config.toml and the site sources
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the site and the team API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Minify CSS/JS, rewrite HTML references and copy assets into dist/
    Build(CacheArgs),
    /// Create .webp siblings for JPEG and PNG images
    ConvertImages,
    /// Check links in the built HTML
    CheckLinks {
        /// Also request external URLs
        #[arg(long)]
        external: bool,
        /// Print every link, not only the dead ones
        #[arg(long, short)]
        verbose: bool,
        /// Directory to check (defaults to the build's dist dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    let site_config = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        _ => config::load_config(&cli.root)?,
    };

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(site_config.server.port);
            let root = cli.root.join(&site_config.server.root);
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&root, addr))?;
        }
        Command::Build(cache_args) => {
            init_thread_pool(&site_config.build);
            println!(
                "==> Building {} → {}",
                site_config.build.source_dir, site_config.build.dist_dir
            );
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::build(
                &cli.root,
                &site_config.build,
                !cache_args.no_cache,
                Some(tx),
            );
            printer.join().ok();
            let report = result?;
            output::print_build_summary(&report);
            if !report.is_clean() {
                println!("==> Build finished with problems");
            } else {
                println!("==> Build complete");
            }
        }
        Command::ConvertImages => {
            init_thread_pool(&site_config.build);
            let dir = cli.root.join(&site_config.images.dir);
            println!("==> Converting images in {}", dir.display());
            let printer_root = dir.clone();
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_convert_event(&event, &printer_root) {
                        println!("{}", line);
                    }
                }
            });
            let report = imaging::convert_all(
                &imaging::RustBackend::new(),
                &dir,
                &site_config.images.extensions,
                Some(tx),
            );
            printer.join().ok();
            output::print_convert_summary(&report);
        }
        Command::CheckLinks {
            external,
            verbose,
            dir,
        } => {
            let dir = dir.unwrap_or_else(|| cli.root.join(&site_config.build.dist_dir));
            let report = check_links(&dir, external)?;
            output::print_link_report(&report, verbose);
            let dead = report.dead_count();
            if dead > 0 {
                return Err(format!("{dead} dead links").into());
            }
        }
        Command::GenConfig => {}
    }

    Ok(())
}

fn check_links(dir: &Path, external: bool) -> Result<links::LinkReport, Box<dyn std::error::Error>> {
    println!("==> Checking links in {}", dir.display());
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        if external {
            let probe = links::ReqwestProbe::new()?;
            links::check_site(dir, Some(&probe as &dyn links::UrlProbe)).await
        } else {
            links::check_site(dir, None).await
        }
    })?;
    Ok(report)
}

/// `RUST_LOG` wins; otherwise this crate logs at info.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rts_site=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on build config.
///
/// Caps at the number of available CPU cores; config can only lower it.
fn init_thread_pool(build: &config::BuildConfig) {
    let threads = config::effective_threads(build);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
