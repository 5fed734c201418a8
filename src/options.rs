//! Parsing Options.
//! `-r {rule}` may be repeated, e.g. `-r psiA -r psiD:p2 -r psiT`.

use clap::{Arg, ArgAction, Command};
use std::error::Error;

use crate::synth::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Ron,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitialNet {
    #[default]
    Seed,
    Chain {
        places: usize,
        transitions: usize,
    },
    /// A `{nodes, edges}` JSON document.
    Document(String),
}

fn make_options_parser() -> clap::Command {
    let parser = Command::new("pn-synth")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Grow sound free-choice workflow nets by synthesis rules")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML file with search budgets")
                .default_value("pn-synth.toml"),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_name("N")
                .help("RNG seed, overrides the config file")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("chain")
                .long("chain")
                .value_name("P,T")
                .help("Start from a linear chain with P places and T transitions")
                .conflicts_with("load"),
        )
        .arg(
            Arg::new("load")
                .short('l')
                .long("load")
                .value_name("FILE")
                .help("Start from a JSON graph document"),
        )
        .arg(
            Arg::new("rule")
                .short('r')
                .long("rule")
                .value_name("RULE")
                .help("Rule to apply: psiA, psiA:tN, psiD, psiD:pN, psiP or psiT")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("random")
                .long("random")
                .value_name("N")
                .help("Apply N randomly chosen rules as one batch after the explicit rules")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("undo")
                .short('u')
                .long("undo")
                .value_name("N")
                .help("Undo the last N steps before writing output")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path to file where the graph document will be stored")
                .default_value("net.json"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .default_values(["json"])
                .value_parser(["json", "ron"]),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Also render the final net as Graphviz DOT"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("FILE")
                .help("Write the action log as JSON records"),
        );
    parser
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub config: String,
    pub seed: Option<u64>,
    pub initial: InitialNet,
    pub rules: Vec<Rule>,
    pub random_steps: usize,
    pub undo: usize,
    pub output: String,
    pub format: OutputFormat,
    pub dot: Option<String>,
    pub log: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            config: "pn-synth.toml".to_string(),
            seed: None,
            initial: InitialNet::Seed,
            rules: Vec::new(),
            random_steps: 0,
            undo: 0,
            output: "net.json".to_string(),
            format: OutputFormat::Json,
            dot: None,
            log: None,
        }
    }
}

fn parse_chain(value: &str) -> Result<InitialNet, Box<dyn Error>> {
    let (places, transitions) = value
        .split_once(',')
        .ok_or_else(|| format!("expected P,T but got `{value}`"))?;
    Ok(InitialNet::Chain {
        places: places.trim().parse()?,
        transitions: transitions.trim().parse()?,
    })
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let initial = match (
            matches.get_one::<String>("chain"),
            matches.get_one::<String>("load"),
        ) {
            (Some(chain), _) => parse_chain(chain)?,
            (None, Some(path)) => InitialNet::Document(path.clone()),
            (None, None) => InitialNet::Seed,
        };

        let rules = matches
            .get_many::<String>("rule")
            .unwrap_or_default()
            .map(|rule| rule.parse::<Rule>())
            .collect::<Result<Vec<_>, _>>()?;

        let format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("ron") => OutputFormat::Ron,
            Some("json") | None => OutputFormat::Json,
            Some(other) => return Err(format!("unsupported output format `{other}`"))?,
        };

        Ok(Options {
            config: matches
                .get_one::<String>("config")
                .cloned()
                .unwrap_or_default(),
            seed: matches.get_one::<u64>("seed").copied(),
            initial,
            rules,
            random_steps: matches.get_one::<usize>("random").copied().unwrap_or(0),
            undo: matches.get_one::<usize>("undo").copied().unwrap_or(0),
            output: matches
                .get_one::<String>("output")
                .cloned()
                .unwrap_or_default(),
            format,
            dot: matches.get_one::<String>("dot").cloned(),
            log: matches.get_one::<String>("log").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{NodeRef, TransitionId};

    #[test]
    fn test_parse_defaults() {
        let options = Options::parse_from_str("").unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_parse_rules_and_chain() {
        let options = Options::parse_from_str(
            "--chain 4,3 -r psiA:t1 -r psiP --random 5 -u 1 -f ron -o out.ron --dot out.dot -s 9",
        )
        .unwrap();
        assert_eq!(
            options.initial,
            InitialNet::Chain {
                places: 4,
                transitions: 3
            }
        );
        assert_eq!(
            options.rules,
            vec![
                Rule::Abstraction {
                    anchor: Some(NodeRef::Transition(TransitionId::new(1))),
                    selection: None,
                },
                Rule::LinearPlace,
            ]
        );
        assert_eq!(options.random_steps, 5);
        assert_eq!(options.undo, 1);
        assert_eq!(options.format, OutputFormat::Ron);
        assert_eq!(options.seed, Some(9));
        assert_eq!(options.dot.as_deref(), Some("out.dot"));
    }

    #[test]
    fn test_parse_from_str_err() {
        assert!(Options::parse_from_str("-r psiZ").is_err());
        assert!(Options::parse_from_str("--chain 3").is_err());
        assert!(Options::parse_from_str("-f yaml").is_err());
    }

    #[test]
    fn test_parse_from_args_err() {
        let options = Options::parse_from_args(&[
            "--chain".to_owned(),
            "3,2".to_owned(),
            "--load".to_owned(),
            "net.json".to_owned(),
        ]);
        assert!(options.is_err());
    }
}
