use anyhow::Result;
use async_trait::async_trait;

use crate::{
    cli::{ConfigTemplateOptions, TemplateFile},
    config::{
        global::GlobalConfig,
        template::{example_answers, render},
    },
};

pub struct ConfigTemplateCommand {
    pub config_template_options: ConfigTemplateOptions,
}

#[async_trait]
impl crate::cmd::Command for ConfigTemplateCommand {
    async fn run(&self) -> Result<()> {
        let doc = match self.config_template_options.file {
            TemplateFile::Global => render(&GlobalConfig::default())?,
            TemplateFile::Answers => render(&example_answers())?,
        };
        print!("{doc}");
        Ok(())
    }
}
