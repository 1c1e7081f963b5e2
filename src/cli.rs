//! Interface de linha de comando do TATKAL baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, check, status)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TATKAL — Motor de reservas automatizadas com múltiplas sessões.
#[derive(Debug, Parser)]
#[command(name = "tatkal", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: ./tatkal.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa uma frota contra o site de reservas simulado.
    Demo {
        /// Número de sessões a lançar (padrão: `browser_count` do plano).
        #[arg(long, short = 'n')]
        instances: Option<usize>,

        /// Sessão (1-based) cujo navegador falha a cada digitação.
        #[arg(long)]
        broken: Option<u32>,

        /// O site derruba o login de cada sessão uma vez.
        #[arg(long, default_value_t = false)]
        kick_out: bool,

        /// Plano de reserva em JSON; usa um plano de exemplo se omitido.
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Valida o plano de reserva e a configuração.
    Check {
        /// Plano de reserva em JSON.
        #[arg(long)]
        plan: PathBuf,

        /// Também verifica o serviço de captcha e o relógio do servidor.
        #[arg(long, default_value_t = false)]
        network: bool,
    },

    /// Mostra o último status publicado por cada sessão.
    Status {
        /// Mostra apenas esta sessão, com o log completo.
        #[arg(long)]
        instance: Option<u32>,
    },
}
