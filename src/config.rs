//! Mechanism for loading the configuration of the momentum measurement

use crate::{numeric::Float, Result};

use eyre::{ensure, eyre, WrapErr};

use std::{fs::File, io::Read, path::Path, str::FromStr};

/// Momentum measurement configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementConfig {
    /// Minimal number of plates that a track must span to be measured
    pub min_plates: i32,

    /// Largest acceptable slope change between two consecutive segments
    pub max_angle_diff: Float,

    /// Whether tracks beyond max_angle_diff are left unmeasured
    pub reject_kinked: bool,
}
//
impl MeasurementConfig {
    /// Load the configuration from a file, check it, and print it out
    pub fn load(file_name: impl AsRef<Path>) -> Result<Self> {
        let file_name = file_name.as_ref();

        // Read out the parameter file or die trying.
        let config_str = {
            let mut config_file = File::open(file_name)
                .wrap_err_with(|| format!("Failed to open {}", file_name.display()))?;
            let mut buffer = String::new();
            config_file.read_to_string(&mut buffer)?;
            buffer
        };
        let config = Self::parse(&config_str)?;

        // Display it, so that the log of a run records what it measured with
        config.print();
        Ok(config)
    }

    /// Decode the contents of a parameter file
    ///
    /// Configuration items are the first non-whitespace chunk of text on each
    /// line, in a fixed order. Blank lines are ignored, and the rest of a line
    /// is free to hold a comment.
    ///
    pub fn parse(config_str: &str) -> Result<Self> {
        let mut config_iter = config_str
            .lines()
            .filter_map(|line| line.split_whitespace().next());

        // This closure fetches the next configuration item, tagging it with
        // the name of the configuration field which it is supposed to fill to
        // ease error reporting, and handling unexpected end-of-file too.
        let mut next_item = |name: &'static str| -> Result<ConfigItem> {
            config_iter
                .next()
                .map(|data| ConfigItem::new(name, data))
                .ok_or_else(|| eyre!("Missing configuration of {}", name))
        };

        let config = Self {
            min_plates: next_item("min_plates")?.parse::<i32>()?,
            max_angle_diff: next_item("max_angle_diff")?.parse::<Float>()?,
            reject_kinked: next_item("reject_kinked")?.parse_bool()?,
        };

        ensure!(config.min_plates >= 0, "min_plates cannot be negative");
        ensure!(
            config.max_angle_diff >= 0.,
            "max_angle_diff cannot be negative"
        );
        Ok(config)
    }

    /// Display the configuration
    pub fn print(&self) {
        println!("MIN_PLATES     : {}", self.min_plates);
        println!("MAX_ANGLE_DIFF : {}", self.max_angle_diff);
        println!("REJECT_KINKED  : {}", self.reject_kinked);
    }
}

impl Default for MeasurementConfig {
    /// Measure every track, flagging but keeping kinked ones
    fn default() -> Self {
        Self {
            min_plates: 0,
            max_angle_diff: 1.0,
            reject_kinked: false,
        }
    }
}

/// A value from the configuration file, tagged with the struct field which it
/// is supposed to map for error reporting purposes.
struct ConfigItem<'data> {
    name: &'static str,
    data: &'data str,
}
//
impl<'data> ConfigItem<'data> {
    /// Build a config item from a struct field tag and raw iterator data
    fn new(name: &'static str, data: &'data str) -> Self {
        Self { name, data }
    }

    /// Parse this data using Rust's standard parsing logic
    fn parse<T: FromStr>(self) -> Result<T>
    where
        <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        self.data
            .parse::<T>()
            .wrap_err_with(|| format!("Could not parse configuration of {}", self.name))
    }

    /// Parse this data as a boolean, also accepting numeric flags
    fn parse_bool(self) -> Result<bool> {
        match self.data.to_lowercase().as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => self.parse::<bool>(),
        }
    }
}
