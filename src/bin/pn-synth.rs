use anyhow::{Context, Result, anyhow};

use pn_synth::config::SynthConfig;
use pn_synth::engine::{EngineError, SynthesisEngine};
use pn_synth::net::GraphDocument;
use pn_synth::net::io::{read_json, write_json, write_ron};
use pn_synth::options::{InitialNet, Options, OutputFormat};
use pn_synth::synth::SynthError;

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let mut flags = shellwords::split(&std::env::var("PN_FLAGS").unwrap_or_default())
        .context("PN_FLAGS is not a valid shell word list")?;
    flags.extend(std::env::args().skip(1));
    let options = Options::parse_from_args(&flags).map_err(|err| anyhow!("{err}"))?;
    log::debug!("pn-synth options: {:?}", options);

    let mut config = SynthConfig::load_from_file(&options.config)?;
    if let Some(seed) = options.seed {
        config.seed = Some(seed);
    }
    let mut engine = SynthesisEngine::with_state_space_oracle(config);

    match &options.initial {
        InitialNet::Seed => engine.init_seed()?,
        InitialNet::Chain {
            places,
            transitions,
        } => engine.init_chain(*places, *transitions)?,
        InitialNet::Document(path) => {
            let document: GraphDocument = read_json(path)
                .with_context(|| format!("Failed to read graph document: {:?}", path))?;
            engine.load_document(&document)?;
        }
    }

    for rule in &options.rules {
        match engine.apply(rule) {
            Ok(_) => {}
            Err(EngineError::Synth(SynthError::RuleNotApplicable(reason))) => {
                log::warn!("{rule} skipped: {reason}");
            }
            Err(err) => return Err(err).with_context(|| format!("Failed to apply {rule}")),
        }
    }

    if options.random_steps > 0 {
        let applied = engine.generate(options.random_steps, &[])?;
        log::info!("{applied} of {} random rules applied", options.random_steps);
    }

    let undone = engine.rewind(options.undo)?;
    if undone < options.undo {
        log::warn!(
            "only {undone} of {} undo steps taken, the initial net is kept",
            options.undo
        );
    }

    let document = engine
        .graph_document()
        .context("no net to write")?;
    let written = match options.format {
        OutputFormat::Json => write_json(&options.output, &document),
        OutputFormat::Ron => write_ron(&options.output, &document),
    };
    written.with_context(|| format!("Failed to write {:?}", options.output))?;

    if let (Some(path), Some(net)) = (&options.dot, engine.net()) {
        net.write_dot(path)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }
    if let Some(path) = &options.log {
        write_json(path, &engine.log_records())
            .with_context(|| format!("Failed to write {:?}", path))?;
    }

    if let Some(matrix) = engine.matrix() {
        print!("{matrix}");
    }
    for entry in engine.log_records() {
        println!("{:>3} {} {}", entry.id, entry.timestamp.to_rfc3339(), entry.action);
    }
    Ok(())
}
