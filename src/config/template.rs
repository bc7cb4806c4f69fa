//! Commented example config files, built from the doc comments of the config types.

use anyhow::{bail, Context as _, Result};
use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, DocumentMut, RawString, Table};

use super::{
    answers::Answers,
    global::{DeviceConfig, GlobalConfig, LinuxConfig, LogConfig, RunConfig},
};

pub trait AsAnnotatedToml {
    fn as_annotated_toml(&self) -> Result<DocumentMut>;
}

impl AsAnnotatedToml for GlobalConfig {
    fn as_annotated_toml(&self) -> Result<DocumentMut> {
        let mut toml = toml_edit::ser::to_string_pretty(self)?.parse::<DocumentMut>()?;
        annotate_toml_table::<GlobalConfig>(toml.as_table_mut())
            .context("Failed to annotate `GlobalConfig`")?;

        let sections: [(&str, fn(&mut Table) -> Result<()>); 4] = [
            ("log", annotate_toml_table::<LogConfig>),
            ("run", annotate_toml_table::<RunConfig>),
            ("device", annotate_toml_table::<DeviceConfig>),
            ("linux", annotate_toml_table::<LinuxConfig>),
        ];
        for (name, annotate) in sections {
            if let Some(table) = toml.get_mut(name).and_then(|item| item.as_table_mut()) {
                annotate(table).with_context(|| format!("Failed to annotate `[{name}]`"))?;
            }
        }
        Ok(toml)
    }
}

impl AsAnnotatedToml for Answers {
    fn as_annotated_toml(&self) -> Result<DocumentMut> {
        let mut toml = toml_edit::ser::to_string_pretty(self)?.parse::<DocumentMut>()?;
        annotate_toml_table::<Answers>(toml.as_table_mut())
            .context("Failed to annotate `Answers`")?;
        Ok(toml)
    }
}

/// The annotated document of `value`, headed by the doc comment of its type.
pub fn render<T: AsAnnotatedToml + Documented>(value: &T) -> Result<String> {
    let header: String = T::DOCS
        .lines()
        .map(|line| format!("# {line}\n").replace("# \n", "#\n"))
        .collect();
    Ok(format!("{header}\n{}", value.as_annotated_toml()?))
}

/// Answers for an unattended install, as an example.
pub fn example_answers() -> Answers {
    Answers {
        device: Some("/dev/sdb".into()),
        device_name: Some("secure-usb".into()),
        wipe: Some(false),
        user_name: Some("user".into()),
        locale: Some("en_US.UTF-8 UTF-8".into()),
        keyboard: Some("us".into()),
        timezone: Some("Europe/Amsterdam".into()),
    }
}

fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let comments: String = docs
        .lines()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_owned()
            } else {
                format!("# {line}\n")
            }
        })
        .collect();

    let new_prefix = match decor.prefix().and_then(RawString::as_str) {
        None | Some("") => comments,
        // Keep a blank comment line between prior comments and ours
        Some(prefix) if prefix.ends_with("#\n") || prefix.ends_with("\n\n") => {
            format!("{prefix}{comments}")
        }
        Some(prefix) => format!("{prefix}#\n{comments}"),
    };
    decor.set_prefix(new_prefix);
}

/// Put the doc comment of each field of `T` above its key in `table`.
///
/// Sub-tables get the doc of their field, but their own keys are left alone.
fn annotate_toml_table<T>(table: &mut Table) -> Result<()>
where
    T: DocumentedFields,
{
    use toml_edit::Item as I;

    for (mut key, value) in table.iter_mut() {
        let field_name = key.get().to_owned();
        let Ok(docs) = T::get_field_docs(&field_name) else {
            continue;
        };

        match value {
            I::None => bail!("Encountered a `None` key unexpectedly"),
            I::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            I::Table(sub_table) => append_docs_as_toml_comments(sub_table.decor_mut(), docs),
            I::ArrayOfTables(array) => {
                let first_table = array
                    .iter_mut()
                    .next()
                    .context("Array of table should not be empty")?;
                append_docs_as_toml_comments(first_table.decor_mut(), docs);
            }
        }
    }

    Ok(())
}
