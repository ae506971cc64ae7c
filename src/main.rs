use arcade_forge::{build, config, output, site};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "arcade-forge")]
#[command(about = "Incremental static site builder for web game portals")]
#[command(long_about = "\
Incremental static site builder for web game portals

Your filesystem is the data source. Per-page HTML files become pages with
clean URLs, static assets are copied through verbatim, and a content
fingerprint cache skips every category of work whose inputs are unchanged.

Content structure:

  content/
  ├── site.toml                # Site config (optional)
  ├── index.html               # Page body → dist/index.html
  ├── about-us.html            # Page body → dist/about-us/index.html
  └── snake.html               # Page body → dist/snake/index.html
  static/
  ├── css/styles.css           # Copied → dist/css/styles.css
  └── img/hero.png             # Copied → dist/img/hero.png
  templates/
  └── page.html                # Tracked: edits trigger page rebuilds

A build writes dist/.build-cache.json with the fingerprints of every
tracked input. The next build skips categories whose fingerprints match;
pass --force to rebuild everything. A failed page degrades to a
<path>.fallback artifact instead of aborting the run.

Run 'arcade-forge gen-config' to print a documented site.toml.")]
#[command(version)]
struct Cli {
    /// Content directory (pages + site.toml)
    #[arg(long, default_value = "content", global = true)]
    content: PathBuf,

    /// Static assets directory
    #[arg(long, default_value = "static", global = true)]
    static_dir: PathBuf,

    /// Templates directory (tracked for invalidation)
    #[arg(long, default_value = "templates", global = true)]
    templates: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site incrementally
    Build {
        /// Rebuild everything, ignoring the change cache
        #[arg(long)]
        force: bool,
    },
    /// Show per-category tracked files and dirtiness without building
    Status,
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let layout = site::SiteLayout {
        content_dir: cli.content.clone(),
        static_dir: cli.static_dir.clone(),
        templates_dir: cli.templates.clone(),
        output_dir: cli.output.clone(),
    };

    match cli.command {
        Command::Build { force } => {
            println!("==> Building site -> {}", layout.output_dir.display());
            let options = build::BuildOptions {
                layout: layout.clone(),
                force,
            };

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for result in rx {
                    println!("{}", output::format_unit_result(&result));
                }
            });

            let result = build::run_build(
                &options,
                |config, data| {
                    site::FsSite::new(
                        layout.clone(),
                        site::BaseContext {
                            site_name: config.site.name.clone(),
                            site_url: config.site.url.clone(),
                            language: config.site.language.clone(),
                        },
                        site::plain_renderer(),
                    )
                    .with_ratings(data.rating_overrides.clone())
                },
                Some(tx),
            );
            printer.join().ok();

            match result {
                Ok(report) => {
                    output::print_build_summary(&report);
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    output::warn("build", &err.to_string());
                    ExitCode::FAILURE
                }
            }
        }
        Command::Status => {
            let statuses = build::site_status(&layout);
            output::print_category_status(&statuses);
            ExitCode::SUCCESS
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            ExitCode::SUCCESS
        }
    }
}
