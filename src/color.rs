use std::{fmt, str::FromStr};

use bytemuck::NoUninit;
use serde::{de::Visitor, Deserialize};

/// RGBA stroke or background color, each channel in range 0-1.
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 0xff)
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<Color> for wgpu::Color {
    fn from(c: Color) -> Self {
        wgpu::Color {
            r: c.r.into(),
            g: c.g.into(),
            b: c.b.into(),
            a: c.a.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseColorError;

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a color name or `#rrggbb[aa]`")
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let named = match s {
            "black" => Some(Color::BLACK),
            "white" => Some(Color::rgb(0xff, 0xff, 0xff)),
            "red" => Some(Color::rgb(0xff, 0x00, 0x00)),
            "green" => Some(Color::rgb(0x00, 0x80, 0x00)),
            "blue" => Some(Color::rgb(0x00, 0x00, 0xff)),
            "gray" => Some(Color::rgb(0x80, 0x80, 0x80)),
            "lightgray" => Some(Color::rgb(0xd3, 0xd3, 0xd3)),
            _ => None,
        };
        if let Some(color) = named {
            return Ok(color);
        }

        let hex = s.strip_prefix('#').ok_or(ParseColorError)?;
        if !hex.is_ascii() || !matches!(hex.len(), 6 | 8) {
            return Err(ParseColorError);
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ParseColorError);
        let alpha = if hex.len() == 8 { channel(6)? } else { 0xff };
        Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
    }
}

impl<'a> Deserialize<'a> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = Color;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("color name or hex color")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse()
                    .map_err(|_| E::custom(format_args!("invalid color '{v}'")))
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}
