use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

/// Courier: a standalone certificate delivery service
#[derive(Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the courier server
    Serve {
        /// address:port to bind the server on
        #[arg(short, long, env = "COURIER_BIND_ADDR")]
        addr: Option<String>,
    },

    /// Get the status of the courier server
    Status {
        /// url to connect to the courier server
        #[arg(short, long, alias = "endpoint", env = "COURIER_CLIENT_URL")]
        url: String,
    },

    /// Store a pkcs12 password using the courier server
    #[command(name = "store:password")]
    #[command(group(ArgGroup::new("source").required(true).args(["password", "file"])))]
    StorePassword {
        /// url to connect to the courier server
        #[arg(short, long, alias = "endpoint", env = "COURIER_CLIENT_URL")]
        url: String,
        /// the id of the certificate to store the password for
        #[arg(short, long)]
        id: String,
        /// the password to store
        #[arg(short, long)]
        password: Option<String>,
        /// specify a file to read the password from
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Store a pkcs12 certificate using the courier server
    #[command(name = "store:certificate")]
    StoreCertificate {
        /// url to connect to the courier server
        #[arg(short, long, alias = "endpoint", env = "COURIER_CLIENT_URL")]
        url: String,
        /// the id of the certificate, used to lookup the stored password
        #[arg(short, long)]
        id: String,
        /// path to the certificate file
        #[arg(short, long)]
        file: PathBuf,
        /// do not decrypt the certificate before storing it
        #[arg(short = 'D', long)]
        no_decrypt: bool,
    },

    /// Get a secret from the secret manager
    #[command(name = "secrets:get")]
    SecretsGet {
        /// project name where the secret is stored
        #[arg(short, long, env = "COURIER_SECRET_MANAGER_PROJECT")]
        project: String,
        /// name of the secret to get
        #[arg(short, long, env = "COURIER_SECRET_NAME")]
        name: String,
        /// path to the credentials file for the secret manager
        #[arg(short, long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
        credentials: Option<PathBuf>,
    },
}
