//! Interface de linha de comando do pressline baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, approve,
//! pending, amend, demo) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::state_machine::{ContentType, RunOptions};

/// pressline: pipeline de conteúdo com revisão humana antes da publicação.
#[derive(Debug, Parser)]
#[command(name = "pressline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = crate::config::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Tipo de conteúdo aceito pela CLI, mapeado para [`ContentType`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ContentTypeArg {
    Article,
    Podcast,
    #[value(name = "linkedin")]
    LinkedIn,
    Thread,
    Newsletter,
}

impl From<ContentTypeArg> for ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Article => ContentType::Article,
            ContentTypeArg::Podcast => ContentType::Podcast,
            ContentTypeArg::LinkedIn => ContentType::LinkedIn,
            ContentTypeArg::Thread => ContentType::Thread,
            ContentTypeArg::Newsletter => ContentType::Newsletter,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pesquisa, redige e revisa um tópico até a fase de revisão.
    Run {
        /// Tópico do conteúdo (também a chave de deduplicação).
        topic: String,

        /// Contexto extra para a pesquisa.
        #[arg(long)]
        context: Option<String>,

        #[arg(long, value_enum, default_value = "article")]
        content_type: ContentTypeArg,

        /// Público-alvo do texto.
        #[arg(long)]
        audience: Option<String>,

        /// Máximo de consultas externas na pesquisa.
        #[arg(long, default_value_t = 6)]
        max_lookups: u32,

        /// Não gera áudio na publicação.
        #[arg(long, default_value_t = false)]
        no_audio: bool,
    },

    /// Aprova um job em revisão e publica.
    Approve {
        /// Id do job ou um prefixo (8 caracteres bastam).
        id: String,
    },

    /// Lista os jobs aguardando revisão.
    Pending,

    /// Acrescenta uma seção ao rascunho de um job em revisão.
    Amend {
        id: String,

        /// O que acrescentar.
        instruction: String,
    },

    /// Executa a demonstração embutida, sem serviços externos.
    Demo,
}

impl Command {
    /// Opções de execução para `run`; `None` para os demais subcomandos.
    pub fn run_options(&self) -> Option<RunOptions> {
        match self {
            Command::Run {
                content_type,
                audience,
                max_lookups,
                no_audio,
                ..
            } => Some(RunOptions {
                content_type: (*content_type).into(),
                audience: audience.clone(),
                max_lookups: *max_lookups,
                generate_audio: !no_audio,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "pressline",
            "run",
            "zero-day disclosure",
            "--content-type",
            "linkedin",
            "--max-lookups",
            "3",
            "--no-audio",
        ]);
        let options = cli.command.run_options().unwrap();
        assert_eq!(options.content_type, ContentType::LinkedIn);
        assert_eq!(options.max_lookups, 3);
        assert!(!options.generate_audio);
        match cli.command {
            Command::Run { topic, context, .. } => {
                assert_eq!(topic, "zero-day disclosure");
                assert!(context.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn run_defaults_match_run_options() {
        let cli = Cli::parse_from(["pressline", "run", "topic"]);
        assert_eq!(cli.command.run_options().unwrap(), RunOptions::default());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["pressline", "--config", "alt.toml", "--verbose", "pending"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Command::Pending));
    }

    #[test]
    fn cli_parses_amend_subcommand() {
        let cli = Cli::parse_from(["pressline", "amend", "1f2e3d4c", "add a case study"]);
        match cli.command {
            Command::Amend { id, instruction } => {
                assert_eq!(id, "1f2e3d4c");
                assert_eq!(instruction, "add a case study");
            }
            _ => panic!("expected Amend command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
