/*
Typed ground station settings.

The settings file is plain `KEY=value` lines. List-valued keys are
comma-joined, booleans are stored as 0/1, and LOCATIONS is a semicolon-joined
list of comma-joined tuples. Keys this struct does not recognize are kept
verbatim and written back on save so side data is never dropped.

Saving goes through a temp file plus rename so a crash mid-write never leaves
a truncated settings file behind.
*/

use std::fs;
use std::io::{BufWriter, Error, ErrorKind, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub available_bauds: Vec<u32>,
    pub format_files: Vec<String>,
    pub opened_recently: Vec<String>,
    pub locations: Vec<Vec<String>>,
    pub autoscroll: bool,
    pub autoscale: bool,
    pub emulator_mode: bool,
    pub layout_autosave: bool,
    pub saving_serial_content: bool,
    pub enable_weather: bool,
    pub dark_theme: bool,
    pub rssi: bool,
    pub selected_port: String,
    pub selected_baud: u32,
    pub current_layout: String,
    /// Lines from the file that no typed field claims, kept as-is
    pub unknown_lines: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            available_bauds: vec![9600, 19200, 38400, 57600, 115200],
            format_files: Vec::new(),
            opened_recently: Vec::new(),
            locations: Vec::new(),
            autoscroll: true,
            autoscale: true,
            emulator_mode: false,
            layout_autosave: false,
            saving_serial_content: false,
            enable_weather: false,
            dark_theme: false,
            rssi: false,
            selected_port: String::new(),
            selected_baud: 9600,
            current_layout: String::new(),
            unknown_lines: Vec::new(),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True")
}

fn parse_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        Vec::new()
    } else {
        value.split(',').map(|s| s.trim().to_string()).collect()
    }
}

fn join_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, Error> {
        let contents = fs::read_to_string(path)?;
        Ok(Settings::from_str_contents(&contents))
    }

    /// Missing file is not an error for callers that want defaults on first run
    pub fn load_or_default(path: &Path) -> Result<Settings, Error> {
        match Settings::load(path) {
            Ok(settings) => Ok(settings),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e),
        }
    }

    fn from_str_contents(contents: &str) -> Settings {
        let mut settings = Settings::default();
        for line in contents.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                settings.unknown_lines.push(line.to_string());
                continue;
            };
            match key.trim() {
                "AVAILABLE_BAUDS" => {
                    settings.available_bauds = parse_list(value)
                        .iter()
                        .filter_map(|b| b.parse().ok())
                        .collect();
                }
                "FORMAT_FILES" => settings.format_files = parse_list(value),
                "OPENED_RECENTLY" => settings.opened_recently = parse_list(value),
                "LOCATIONS" => {
                    settings.locations = value
                        .split(';')
                        .filter(|group| !group.trim().is_empty())
                        .map(parse_list)
                        .collect();
                }
                "AUTOSCROLL" => settings.autoscroll = parse_bool(value),
                "AUTOSCALE" => settings.autoscale = parse_bool(value),
                "EMULATOR_MODE" => settings.emulator_mode = parse_bool(value),
                "LAYOUT_AUTOSAVE" => settings.layout_autosave = parse_bool(value),
                "SAVING_SERIAL_CONTENT" => settings.saving_serial_content = parse_bool(value),
                "ENABLE_WEATHER" => settings.enable_weather = parse_bool(value),
                "DARK_THEME" => settings.dark_theme = parse_bool(value),
                "RSSI" => settings.rssi = parse_bool(value),
                "SELECTED_PORT" => settings.selected_port = value.trim().to_string(),
                "SELECTED_BAUD" => {
                    settings.selected_baud = value.trim().parse().unwrap_or(9600);
                }
                "CURRENT_LAYOUT" => settings.current_layout = value.trim().to_string(),
                _ => settings.unknown_lines.push(line.to_string()),
            }
        }
        settings
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let tmp_path = path.with_extension("tmp");
        {
            let file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writeln!(
                writer,
                "AVAILABLE_BAUDS={}",
                self.available_bauds
                    .iter()
                    .map(|b| b.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            )?;
            writeln!(writer, "FORMAT_FILES={}", self.format_files.join(","))?;
            writeln!(writer, "OPENED_RECENTLY={}", self.opened_recently.join(","))?;
            writeln!(
                writer,
                "LOCATIONS={}",
                self.locations
                    .iter()
                    .map(|group| group.join(","))
                    .collect::<Vec<_>>()
                    .join(";")
            )?;
            writeln!(writer, "AUTOSCROLL={}", join_bool(self.autoscroll))?;
            writeln!(writer, "AUTOSCALE={}", join_bool(self.autoscale))?;
            writeln!(writer, "EMULATOR_MODE={}", join_bool(self.emulator_mode))?;
            writeln!(writer, "LAYOUT_AUTOSAVE={}", join_bool(self.layout_autosave))?;
            writeln!(
                writer,
                "SAVING_SERIAL_CONTENT={}",
                join_bool(self.saving_serial_content)
            )?;
            writeln!(writer, "ENABLE_WEATHER={}", join_bool(self.enable_weather))?;
            writeln!(writer, "DARK_THEME={}", join_bool(self.dark_theme))?;
            writeln!(writer, "RSSI={}", join_bool(self.rssi))?;
            writeln!(writer, "SELECTED_PORT={}", self.selected_port)?;
            writeln!(writer, "SELECTED_BAUD={}", self.selected_baud)?;
            writeln!(writer, "CURRENT_LAYOUT={}", self.current_layout)?;
            for line in &self.unknown_lines {
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp_dir = TempDir::new("gs_settings").unwrap();
        let path = tmp_dir.path().join("settings");

        let mut settings = Settings::default();
        settings.selected_port = "/dev/ttyUSB0".to_string();
        settings.selected_baud = 115200;
        settings.emulator_mode = true;
        settings.format_files = vec!["balloon_v2".to_string(), "cutdown".to_string()];
        settings.locations = vec![
            vec!["Esrange".to_string(), "67.89".to_string(), "21.10".to_string()],
            vec!["Kiruna".to_string(), "67.85".to_string(), "20.22".to_string()],
        ];

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_unknown_lines_survive_round_trip() {
        let tmp_dir = TempDir::new("gs_settings").unwrap();
        let path = tmp_dir.path().join("settings");
        fs::write(&path, "SELECTED_BAUD=57600\nPLOT_BACKEND=pyqtgraph\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.selected_baud, 57600);
        assert_eq!(settings.unknown_lines, vec!["PLOT_BACKEND=pyqtgraph"]);

        settings.save(&path).unwrap();
        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp_dir = TempDir::new("gs_settings").unwrap();
        let path = tmp_dir.path().join("settings");
        let settings = Settings::load_or_default(&path).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_bool_encoding_is_zero_one() {
        let tmp_dir = TempDir::new("gs_settings").unwrap();
        let path = tmp_dir.path().join("settings");
        let mut settings = Settings::default();
        settings.dark_theme = true;
        settings.save(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("DARK_THEME=1"));
        assert!(contents.contains("EMULATOR_MODE=0"));
    }
}
