use clap::Parser;

use tollgate_common::GlobalConfigPatch;

#[derive(Parser)]
#[command(name = "tollgate")]
pub(crate) struct Cli {
    #[arg(long, env = "TOLLGATE_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "TOLLGATE_PORT")]
    pub(crate) port: Option<u16>,
    #[arg(long, env = "TOLLGATE_DSN")]
    pub(crate) dsn: Option<String>,
    #[arg(long, env = "TOLLGATE_UPSTREAM_BASE_URL")]
    pub(crate) upstream_base_url: Option<String>,
    #[arg(long, env = "TOLLGATE_PUBLIC_BASE_PATH")]
    pub(crate) public_base_path: Option<String>,
    #[arg(long, env = "TOLLGATE_UPSTREAM_API_KEY")]
    pub(crate) upstream_api_key: Option<String>,
    #[arg(long, env = "TOLLGATE_PRICING_FILE")]
    pub(crate) pricing_file: Option<String>,
}

impl Cli {
    pub(crate) fn into_patch(self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host,
            port: self.port,
            dsn: self.dsn,
            upstream_base_url: self.upstream_base_url,
            public_base_path: self.public_base_path,
            upstream_api_key: self.upstream_api_key,
            pricing_file: self.pricing_file,
        }
    }
}
