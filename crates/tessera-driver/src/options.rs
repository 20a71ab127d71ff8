use std::path::{Path, PathBuf};

use serde::Deserialize;
use tessera_codegen::GeneratorOptions;

use crate::DriverError;

/// Settings read from `tessera.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub pooling_enabled: bool,
    pub tag_pool_size: usize,
    /// Break literal output at every template newline.
    pub mapped_file: bool,
    pub gen_string_as_byte_array: bool,
    pub error_on_use_bean_invalid_class_attribute: bool,
    pub x_powered_by: bool,
    pub trim_spaces: bool,
    pub default_buffer_size: usize,
    /// Where generated units are written, relative to the project root.
    pub output_dir: PathBuf,
    pub runtime_crate: String,
    pub plugin_ie_class_id: String,
    pub plugin_ie_url: String,
    pub plugin_ns_url: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        let generator = GeneratorOptions::default();
        Self {
            pooling_enabled: generator.pooling_enabled,
            tag_pool_size: generator.tag_pool_size,
            mapped_file: generator.mapped_file,
            gen_string_as_byte_array: generator.gen_string_as_byte_array,
            error_on_use_bean_invalid_class_attribute: generator
                .error_on_use_bean_invalid_class_attribute,
            x_powered_by: generator.x_powered_by,
            trim_spaces: generator.trim_spaces,
            default_buffer_size: generator.default_buffer_size,
            output_dir: PathBuf::from("target/tessera-gen"),
            runtime_crate: generator.runtime_crate,
            plugin_ie_class_id: generator.plugin_ie_class_id,
            plugin_ie_url: generator.plugin_ie_url,
            plugin_ns_url: generator.plugin_ns_url,
        }
    }
}

impl CompilerOptions {
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|err| {
            DriverError::Config(format!("failed to parse {}: {err}", path.display()))
        })
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads `tessera.toml` under `root`, falling back to defaults when the
    /// project has none.
    pub fn for_project(root: &Path) -> Result<Self, DriverError> {
        let path = root.join("tessera.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            pooling_enabled: self.pooling_enabled,
            tag_pool_size: self.tag_pool_size,
            mapped_file: self.mapped_file,
            gen_string_as_byte_array: self.gen_string_as_byte_array,
            error_on_use_bean_invalid_class_attribute: self
                .error_on_use_bean_invalid_class_attribute,
            x_powered_by: self.x_powered_by,
            trim_spaces: self.trim_spaces,
            default_buffer_size: self.default_buffer_size,
            runtime_crate: self.runtime_crate.clone(),
            plugin_ie_class_id: self.plugin_ie_class_id.clone(),
            plugin_ie_url: self.plugin_ie_url.clone(),
            plugin_ns_url: self.plugin_ns_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let options = CompilerOptions::parse("").unwrap();
        assert_eq!(options, CompilerOptions::default());
        assert_eq!(options.tag_pool_size, 5);
        assert_eq!(options.output_dir, PathBuf::from("target/tessera-gen"));
        assert_eq!(options.to_generator_options(), GeneratorOptions::default());
    }

    #[test]
    fn keys_override_defaults() {
        let options = CompilerOptions::parse(
            "pooling_enabled = false\nmapped_file = true\noutput_dir = \"gen\"\n",
        )
        .unwrap();
        assert!(!options.pooling_enabled);
        assert!(options.mapped_file);
        assert_eq!(options.output_dir, PathBuf::from("gen"));
        let generator = options.to_generator_options();
        assert!(!generator.pooling_enabled);
        assert!(generator.mapped_file);
        assert!(generator.gen_string_as_byte_array);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(CompilerOptions::parse("tag_pool_size = \"five\"").is_err());
    }
}
