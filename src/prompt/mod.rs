//! Interactive collection of the install answers.
//!
//! Only the answers missing from `answers.toml` are asked for. Every prompt can be
//! cancelled with Esc, which ends the install before anything is run.

pub mod catalog;

use anyhow::{bail, Context as _, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};
use lazy_static::lazy_static;
use regex::Regex;

use crate::{config::answers::Answers, console::Console, types::Secret};

pub const DEFAULT_HOSTNAME: &str = "secure-usb";

lazy_static! {
    static ref HOSTNAME: Regex =
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("hostname pattern is valid");
    static ref USER_NAME: Regex =
        Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("user name pattern is valid");
    static ref DEVICE: Regex =
        Regex::new(r"^/dev/[A-Za-z0-9][A-Za-z0-9/_.:-]*$").expect("device pattern is valid");
    static ref LOCALE: Regex = Regex::new(r"^[A-Za-z0-9_.@-]+( [A-Za-z0-9_.@-]+)?$")
        .expect("locale pattern is valid");
    static ref KEYMAP: Regex = Regex::new(r"^[A-Za-z0-9_.+-]+$").expect("keymap pattern is valid");
    static ref TIMEZONE: Regex = Regex::new(r"^[A-Za-z0-9_+-]+(/[A-Za-z0-9_+-]+)*$")
        .expect("timezone pattern is valid");
}

pub fn validate_hostname(name: &str) -> Result<(), String> {
    if HOSTNAME.is_match(name) {
        Ok(())
    } else {
        Err("Use lower-case letters, digits and inner dashes (at most 63 characters)".into())
    }
}

pub fn validate_user_name(name: &str) -> Result<(), String> {
    if name == "root" {
        return Err("The user must not be root".into());
    }
    if USER_NAME.is_match(name) {
        Ok(())
    } else {
        Err("Start with a lower-case letter or '_', then letters, digits, '_' or '-'".into())
    }
}

pub fn validate_device(path: &str) -> Result<(), String> {
    if DEVICE.is_match(path) && !path.contains("..") {
        Ok(())
    } else {
        Err(format!("\"{path}\" is not a device path below /dev"))
    }
}

pub fn validate_locale(locale: &str) -> Result<(), String> {
    if LOCALE.is_match(locale) {
        Ok(())
    } else {
        Err(format!("\"{locale}\" is not a line of the form \"en_US.UTF-8 UTF-8\""))
    }
}

pub fn validate_keyboard(keymap: &str) -> Result<(), String> {
    if KEYMAP.is_match(keymap) {
        Ok(())
    } else {
        Err(format!("\"{keymap}\" is not a keymap name"))
    }
}

pub fn validate_timezone(zone: &str) -> Result<(), String> {
    if TIMEZONE.is_match(zone) && !zone.split('/').any(|part| part == "..") {
        Ok(())
    } else {
        Err(format!("\"{zone}\" is not a time zone name"))
    }
}

/// Answers the prompts would never have accepted. They end up in root shell commands,
/// so anything listed here must stop the install.
pub fn answer_problems(answers: &Answers) -> Vec<String> {
    let checks: [(&str, Option<&String>, fn(&str) -> Result<(), String>); 6] = [
        ("device", answers.device.as_ref(), validate_device),
        ("device_name", answers.device_name.as_ref(), validate_hostname),
        ("user_name", answers.user_name.as_ref(), validate_user_name),
        ("locale", answers.locale.as_ref(), validate_locale),
        ("keyboard", answers.keyboard.as_ref(), validate_keyboard),
        ("timezone", answers.timezone.as_ref(), validate_timezone),
    ];
    checks
        .into_iter()
        .filter_map(|(name, value, validate)| {
            value
                .and_then(|value| validate(value).err())
                .map(|reason| format!("{name}: {reason}"))
        })
        .collect()
}

/// Answers and the password after the prompts are done.
pub struct Selections {
    pub answers: Answers,
    pub password: Secret,
}

pub struct Prompter {
    theme: ColorfulTheme,
    console: Console,
}

impl Prompter {
    pub fn new(console: Console) -> Self {
        Self {
            theme: ColorfulTheme::default(),
            console,
        }
    }

    /// Ask for every answer `given` lacks. `None` if the user cancelled a prompt.
    pub async fn collect(&self, given: &Answers) -> Result<Option<Selections>> {
        let mut answers = given.clone();

        if answers.device.is_none() {
            let Some(device) = self.select_drive().await? else {
                return Ok(None);
            };
            answers.device = Some(device);
        }
        if answers.device_name.is_none() {
            answers.device_name = Some(self.ask_hostname()?);
        }
        if answers.wipe.is_none() {
            let device = answers.device.as_deref().unwrap_or_default();
            answers.wipe = Some(self.ask_wipe(device)?);
        }
        if answers.user_name.is_none() {
            answers.user_name = Some(self.ask_user_name()?);
        }
        let password = self.ask_password()?;

        if answers.locale.is_none() {
            let locales = catalog::locales(catalog::SUPPORTED_LOCALES).await?;
            let Some(locale) = self.select_filtered("Locale", "en_US", &locales)? else {
                return Ok(None);
            };
            answers.locale = Some(locale);
        }
        if answers.keyboard.is_none() {
            let layouts = catalog::keyboard_layouts(catalog::KEYMAP_DIRS)?;
            let Some(layout) = self.select_one("Select keyboard layout", &layouts, "us")? else {
                return Ok(None);
            };
            answers.keyboard = Some(layout);
        }
        if answers.timezone.is_none() {
            let zones = catalog::timezones(catalog::ZONEINFO_DIR)?;
            let Some(zone) = self.select_filtered("Timezone", "", &zones)? else {
                return Ok(None);
            };
            answers.timezone = Some(zone);
        }

        Ok(Some(Selections { answers, password }))
    }

    async fn select_drive(&self) -> Result<Option<String>> {
        let drives = catalog::drives().await?;
        if drives.is_empty() {
            bail!("No drives found. Please ensure you have a drive connected.");
        }
        let labels: Vec<String> = drives.iter().map(catalog::Drive::label).collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Select the drive to install to")
            .items(&labels)
            .default(0)
            .interact_opt()
            .context("Failed to read drive selection")?;
        Ok(choice.map(|index| drives[index].path()))
    }

    fn ask_hostname(&self) -> Result<String> {
        let name: String = Input::with_theme(&self.theme)
            .with_prompt("Device name (hostname)")
            .default(DEFAULT_HOSTNAME.to_owned())
            .validate_with(|input: &String| validate_hostname(&input.trim().to_lowercase()))
            .interact_text()
            .context("Failed to read device name")?;
        Ok(name.trim().to_lowercase())
    }

    fn ask_wipe(&self, device: &str) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(format!(
                "Overwrite {device} with random data first? This can take hours"
            ))
            .default(false)
            .interact()
            .context("Failed to read wipe answer")
    }

    fn ask_user_name(&self) -> Result<String> {
        let name: String = Input::with_theme(&self.theme)
            .with_prompt("User name")
            .validate_with(|input: &String| validate_user_name(input.trim()))
            .interact_text()
            .context("Failed to read user name")?;
        Ok(name.trim().to_owned())
    }

    fn ask_password(&self) -> Result<Secret> {
        let password = Password::with_theme(&self.theme)
            .with_prompt("Password (used for the user and both encrypted partitions)")
            .with_confirmation("Repeat password", "Passwords do not match, try again")
            .interact()
            .context("Failed to read password")?;
        Ok(Secret::from(password))
    }

    /// Ask for a filter text, then offer the matching items. An empty match asks again.
    fn select_filtered(&self, what: &str, default: &str, items: &[String]) -> Result<Option<String>> {
        if items.is_empty() {
            bail!("No {} found", what.to_lowercase());
        }
        loop {
            let needle: String = Input::with_theme(&self.theme)
                .with_prompt(format!("{what} filter (leave blank for all)"))
                .default(default.to_owned())
                .allow_empty(true)
                .interact_text()
                .with_context(|| format!("Failed to read {} filter", what.to_lowercase()))?;

            let matches: Vec<String> = catalog::filter(items, &needle)
                .into_iter()
                .cloned()
                .collect();
            if matches.is_empty() {
                self.console.warn(&format!("Nothing matches '{needle}'"));
                continue;
            }
            return self.select_one(&format!("Select {}", what.to_lowercase()), &matches, "");
        }
    }

    fn select_one(&self, prompt: &str, items: &[String], preferred: &str) -> Result<Option<String>> {
        if items.is_empty() {
            bail!("Nothing to choose from for: {prompt}");
        }
        let default = items.iter().position(|item| item == preferred).unwrap_or(0);
        let choice = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .max_length(15)
            .interact_opt()
            .with_context(|| format!("Failed to read selection: {prompt}"))?;
        Ok(choice.map(|index| items[index].clone()))
    }

    pub fn confirm_install(&self) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt("Are these selections correct, and continue installation?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

pub fn summary(console: &Console, answers: &Answers) {
    let text = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_owned());
    console.rule("Selections");
    console.field("Drive", &text(&answers.device));
    console.field("Device name", &text(&answers.device_name));
    console.field(
        "Wipe drive",
        match answers.wipe {
            Some(true) => "yes",
            _ => "no",
        },
    );
    console.field("User", &text(&answers.user_name));
    console.field("Password", "********");
    console.field("Locale", &text(&answers.locale));
    console.field("Keyboard", &text(&answers.keyboard));
    console.field("Timezone", &text(&answers.timezone));
}

#[cfg(test)]
pub mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("secure-usb", true)]
    #[case("usb0", true)]
    #[case("a", true)]
    #[case("-usb", false)]
    #[case("usb-", false)]
    #[case("Secure", false)]
    #[case("my_usb", false)]
    #[case("", false)]
    fn test_validate_hostname(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_hostname(name).is_ok(), valid);
    }

    #[rstest]
    #[case("alice", true)]
    #[case("_svc", true)]
    #[case("bob-2", true)]
    #[case("root", false)]
    #[case("2bob", false)]
    #[case("Alice", false)]
    #[case("al ice", false)]
    fn test_validate_user_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_user_name(name).is_ok(), valid);
    }

    #[rstest]
    #[case("/dev/sdb", true)]
    #[case("/dev/nvme0n1", true)]
    #[case("/dev/disk/by-id/usb-SanDisk_Ultra_0401-0:0", true)]
    #[case("sdb", false)]
    #[case("/dev/sdb; reboot", false)]
    #[case("/dev/../etc/passwd", false)]
    #[case("/dev/$(id)", false)]
    fn test_validate_device(#[case] path: &str, #[case] valid: bool) {
        assert_eq!(validate_device(path).is_ok(), valid);
    }

    #[rstest]
    #[case(validate_locale, "en_US.UTF-8 UTF-8", true)]
    #[case(validate_locale, "sr_RS@latin UTF-8", true)]
    #[case(validate_locale, "en_US.UTF-8 UTF-8; id", false)]
    #[case(validate_keyboard, "de-latin1-nodeadkeys", true)]
    #[case(validate_keyboard, "us`id`", false)]
    #[case(validate_timezone, "America/Argentina/Buenos_Aires", true)]
    #[case(validate_timezone, "Etc/GMT+1", true)]
    #[case(validate_timezone, "../../etc/shadow", false)]
    #[case(validate_timezone, "UTC && id", false)]
    fn test_validate_catalog_values(
        #[case] validate: fn(&str) -> Result<(), String>,
        #[case] value: &str,
        #[case] valid: bool,
    ) {
        assert_eq!(validate(value).is_ok(), valid);
    }

    #[test]
    fn test_answer_problems() {
        assert!(answer_problems(&Answers::default()).is_empty());

        let answers = Answers {
            device: Some("sdb".into()),
            device_name: Some("x; touch /tmp/owned".into()),
            user_name: Some("root".into()),
            timezone: Some("Europe/Amsterdam".into()),
            ..Default::default()
        };
        let problems = answer_problems(&answers);
        assert_eq!(problems.len(), 3);
        assert!(problems[0].starts_with("device: "));
        assert!(problems[1].starts_with("device_name: "));
        assert!(problems[2].starts_with("user_name: "));
    }
}
