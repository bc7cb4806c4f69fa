use std::path::Path;

use anyhow::Result;

use super::{Command, IntoCommand, Session};
use crate::plan::Plan;

pub mod check;
pub mod show;

impl IntoCommand for crate::cli::PlanSubcommand {
    fn into_command(self, _session: Session) -> Box<dyn Command> {
        match self {
            crate::cli::PlanSubcommand::Show(plan_show_options) => {
                Box::new(show::PlanShowCommand { plan_show_options })
            }
            crate::cli::PlanSubcommand::Check(plan_check_options) => {
                Box::new(check::PlanCheckCommand { plan_check_options })
            }
        }
    }
}

/// The plan in `path`, or the one `install` would run.
pub async fn load_plan(path: Option<&Path>) -> Result<Plan> {
    match path {
        Some(path) => Plan::load(path).await,
        None => {
            crate::config::source::get_config_source()
                .await
                .get_plan()
                .await
        }
    }
}
