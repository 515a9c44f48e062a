//! Notate CLI: compiles and renders a small set of named demo sessions.
//!
//! There is no score DSL (`spec.md`'s scope is the library API, not an
//! authoring surface); the CLI exists to exercise `to_bundles`/`render`
//! against example sessions built in code.

use clap::{Parser, Subcommand};
use notate::node::{AddAction, ControlValue, NodeId};
use notate::render::{self, RenderOptions};
use notate::session::Session;
use notate::synthdef::OpaqueSynthDef;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "notate")]
#[command(about = "A non-realtime session compiler for offline computer-music rendering")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a demo session and write its bundle file.
    Compile {
        /// Which demo session to build.
        #[arg(value_enum, default_value = "two-synths")]
        demo: Demo,
        /// Override duration in seconds; defaults to the session's intrinsic duration.
        #[arg(short, long)]
        duration: Option<f64>,
        /// Where to write the bundle file.
        #[arg(short, long, default_value = "score.bundle")]
        output: PathBuf,
    },
    /// Compile and render a demo session to a sound file via an external renderer.
    Render {
        #[arg(value_enum, default_value = "two-synths")]
        demo: Demo,
        #[arg(short, long)]
        duration: Option<f64>,
        #[arg(short, long, default_value = "out.aiff")]
        output: PathBuf,
        /// Path to a TOML render-options file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum Demo {
    TwoSynths,
    GatedSynth,
}

fn build_demo(demo: Demo) -> Session {
    let mut session = Session::new(2, 0);
    let name = session.register_synthdef(OpaqueSynthDef::new(
        vec![0, 1, 2, 3],
        match demo {
            Demo::TwoSynths => vec!["freq".to_string()],
            Demo::GatedSynth => vec!["freq".to_string(), "gate".to_string()],
        },
    ));
    let root = NodeId(0);
    match demo {
        Demo::TwoSynths => {
            session
                .add_synth(0.0, AddAction::AddToHead(root), &name, Some(10.0), vec![("freq".into(), ControlValue::Scalar(440.0))])
                .expect("valid session construction");
            session
                .add_synth(0.0, AddAction::AddToHead(root), &name, Some(15.0), vec![("freq".into(), ControlValue::Scalar(220.0))])
                .expect("valid session construction");
        }
        Demo::GatedSynth => {
            session
                .add_synth(0.0, AddAction::AddToHead(root), &name, Some(10.0), vec![("freq".into(), ControlValue::Scalar(330.0))])
                .expect("valid session construction");
        }
    }
    session
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile { demo, duration, output } => {
            let mut session = build_demo(demo);
            session.to_datagram(duration).and_then(|bytes| render::write_bundle_file(&output, &bytes))
        }
        Commands::Render { demo, duration, output, config } => {
            let mut session = build_demo(demo);
            let options = match config {
                Some(path) => std::fs::read_to_string(&path)
                    .map_err(notate::CompileError::from)
                    .and_then(|text| RenderOptions::from_toml(&text)),
                None => Ok(RenderOptions::default()),
            };
            options.and_then(|options| {
                let bundle_path = output.with_extension("bundle");
                render::render(&mut session, duration, &bundle_path, None, &output, &options)
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "notate failed");
            ExitCode::FAILURE
        }
    }
}
