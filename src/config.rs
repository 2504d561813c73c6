use std::{collections::HashMap, fs, path::Path};

use anyhow::bail;
use serde::{
    de::{value::StrDeserializer, IntoDeserializer, Visitor},
    Deserialize,
};
use winit::keyboard::KeyCode;

use crate::color::Color;

#[derive(Deserialize)]
pub struct Config {
    /// Name of the monitor to go fullscreen on. Windowed if unset.
    pub monitor: Option<String>,
    /// On-screen stroke width in pixels, at any zoom level.
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,
    #[serde(default = "default_background")]
    pub background: Color,
    /// Selectable stroke colors. The first one is used initially.
    pub palette: Vec<Color>,
    #[serde(default)]
    pub bind: HashMap<Key, CommandVerb>,
}

fn default_stroke_width() -> f32 {
    2.0
}

fn default_background() -> Color {
    Color::rgb(0xcc, 0xcc, 0xcc)
}

impl Config {
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        log::debug!(
            "loaded config from `{}` ({} colors, {} key bindings)",
            path.display(),
            config.palette.len(),
            config.bind.len()
        );
        Ok(config)
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;

        if config.palette.is_empty() {
            bail!("`palette` must contain at least one color");
        }
        if !(config.stroke_width > 0.0) {
            bail!(
                "`stroke_width` must be positive (found {})",
                config.stroke_width
            );
        }

        Ok(config)
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Key(pub(crate) KeyCode);

impl<'a> Deserialize<'a> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = Key;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("key code name")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let name: StrDeserializer<'_, E> = v.into_deserializer();
                Ok(Key(KeyCode::deserialize(name).map_err(|_| {
                    E::custom(format_args!("invalid key code name '{v}'"))
                })?))
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CommandVerb {
    #[serde(rename = "UNDO")]
    Undo,
    #[serde(rename = "CLEAR")]
    Clear,
    #[serde(rename = "ZOOM_IN")]
    ZoomIn,
    #[serde(rename = "ZOOM_OUT")]
    ZoomOut,
    #[serde(rename = "RESET_VIEW")]
    ResetView,
    #[serde(rename = "TOGGLE_HAND")]
    ToggleHand,
    #[serde(rename = "NEXT_COLOR")]
    NextColor,
}
