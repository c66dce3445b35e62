use structopt::StructOpt;

#[derive(StructOpt)]
pub struct Options {
    /// Path of the config file
    #[structopt(default_value = "config.toml")]
    pub config: String,

    /// Path of the GraphQL document to execute
    pub query: String,

    /// Name of the operation to execute
    #[structopt(long)]
    pub operation: Option<String>,

    /// Variables as a JSON object
    #[structopt(long)]
    pub variables: Option<String>,
}
