use super::{Command, IntoCommand, Session};

pub mod check;
pub mod template;

impl IntoCommand for crate::cli::ConfigSubcommand {
    fn into_command(self, _session: Session) -> Box<dyn Command> {
        match self {
            crate::cli::ConfigSubcommand::Check(config_check_options) => {
                Box::new(check::ConfigCheckCommand {
                    config_check_options,
                })
            }
            crate::cli::ConfigSubcommand::Template(config_template_options) => {
                Box::new(template::ConfigTemplateCommand {
                    config_template_options,
                })
            }
        }
    }
}
