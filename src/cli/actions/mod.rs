pub mod run;

use crate::collectors::ScraperConfig;

#[derive(Debug)]
pub enum Action {
    Run {
        port: u16,
        listen: Option<String>,
        config: ScraperConfig,
    },
}
