//! Styled view tree handed over by the render layer for export.
//!
//! Styles are the *computed* values of each element, so the export pipeline
//! never has to resolve a cascade. The whole tree is serde-friendly so a host
//! can hand it over as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid color '{0}'")]
pub struct ColorParseError(pub String);

/// An sRGB color with straight (non-premultiplied) alpha in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0.0 };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    pub fn is_translucent(&self) -> bool {
        self.a > 0.0 && self.a < 1.0
    }

    /// Same hue with full alpha.
    pub fn solid(self) -> Self {
        Self { a: 1.0, ..self }
    }

    /// Composite `self` over an opaque `backdrop`.
    pub fn over(self, backdrop: Rgba) -> Rgba {
        let a = self.a.clamp(0.0, 1.0);
        let mix = |fg: u8, bg: u8| (fg as f32 * a + bg as f32 * (1.0 - a)).round() as u8;
        Rgba::opaque(mix(self.r, backdrop.r), mix(self.g, backdrop.g), mix(self.b, backdrop.b))
    }

    /// Parse the CSS forms the render layer emits: `#rgb`, `#rrggbb`,
    /// `#rrggbbaa`, `rgb(...)`, `rgba(...)` and `transparent`.
    pub fn parse(input: &str) -> Result<Self, ColorParseError> {
        let s = input.trim();
        let err = || ColorParseError(input.to_string());

        if s.eq_ignore_ascii_case("transparent") {
            return Ok(Rgba::TRANSPARENT);
        }

        if let Some(hex) = s.strip_prefix('#') {
            let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|v| v * 17);
            let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(err());
            }
            return match hex.len() {
                3 => Ok(Rgba::opaque(
                    nibble(0).map_err(|_| err())?,
                    nibble(1).map_err(|_| err())?,
                    nibble(2).map_err(|_| err())?,
                )),
                6 | 8 => {
                    let alpha = if hex.len() == 8 {
                        byte(6).map_err(|_| err())? as f32 / 255.0
                    } else {
                        1.0
                    };
                    Ok(Rgba {
                        r: byte(0).map_err(|_| err())?,
                        g: byte(2).map_err(|_| err())?,
                        b: byte(4).map_err(|_| err())?,
                        a: alpha,
                    })
                }
                _ => Err(err()),
            };
        }

        let lower = s.to_ascii_lowercase();
        let args = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;
        let parts: Vec<&str> = args
            .split(|c: char| c == ',' || c == '/' || c == ' ')
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(err());
        }
        let channel = |p: &str| p.parse::<f32>().map(|v| v.clamp(0.0, 255.0).round() as u8);
        let alpha = match parts.get(3) {
            Some(p) if p.ends_with('%') => {
                p.trim_end_matches('%').parse::<f32>().map_err(|_| err())? / 100.0
            }
            Some(p) => p.parse::<f32>().map_err(|_| err())?,
            None => 1.0,
        };
        Ok(Rgba {
            r: channel(parts[0]).map_err(|_| err())?,
            g: channel(parts[1]).map_err(|_| err())?,
            b: channel(parts[2]).map_err(|_| err())?,
            a: alpha.clamp(0.0, 1.0),
        })
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgba::parse(&value)
    }
}

impl From<Rgba> for String {
    fn from(color: Rgba) -> Self {
        color.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundImage {
    LinearGradient { stops: Vec<Rgba> },
    RadialGradient { stops: Vec<Rgba> },
    Url { href: String },
}

impl BackgroundImage {
    pub fn is_gradient(&self) -> bool {
        matches!(
            self,
            BackgroundImage::LinearGradient { .. } | BackgroundImage::RadialGradient { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundClip {
    #[default]
    BorderBox,
    Text,
}

/// Computed style of one element, limited to what affects rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputedStyle {
    pub opacity: f32,
    pub background_color: Option<Rgba>,
    pub background_image: Option<BackgroundImage>,
    pub background_clip: BackgroundClip,
    pub filter: Option<String>,
    pub backdrop_filter: Option<String>,
    pub color: Rgba,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            background_color: None,
            background_image: None,
            background_clip: BackgroundClip::BorderBox,
            filter: None,
            backdrop_filter: None,
            color: Rgba::opaque(0x1f, 0x29, 0x37),
        }
    }
}

/// Layout box in CSS pixels, relative to the document origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub style: ComputedStyle,
    /// Visible (viewport-clipped) box.
    pub frame: Rect,
    /// Full scrollable content size, when larger than the frame.
    #[serde(default)]
    pub scroll_size: Option<(f32, f32)>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<ViewNode>,
}

fn default_tag() -> String {
    "div".to_string()
}

impl ViewNode {
    pub fn new(tag: &str, frame: Rect) -> Self {
        Self {
            id: None,
            tag: tag.to_string(),
            classes: Vec::new(),
            style: ComputedStyle::default(),
            frame,
            scroll_size: None,
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_style(mut self, style: ComputedStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_child(mut self, child: ViewNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn find(&self, id: &str) -> Option<&ViewNode> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut ViewNode> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Visit this node and every descendant, depth first.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut ViewNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    pub fn walk(&self, visit: &mut impl FnMut(&ViewNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Natural (unclipped) content size of this subtree, measured from this
    /// node's origin: the larger of its scroll size and the extent of every
    /// descendant box.
    pub fn natural_size(&self) -> (f32, f32) {
        let origin = self.frame;
        let (mut width, mut height) = self
            .scroll_size
            .unwrap_or((origin.width, origin.height));
        width = width.max(origin.width);
        height = height.max(origin.height);
        self.walk(&mut |node| {
            width = width.max(node.frame.right() - origin.x);
            height = height.max(node.frame.bottom() - origin.y);
        });
        (width, height)
    }
}

/// A `<style>` element living in the document head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleElement {
    pub id: String,
    pub css: String,
}

/// The live rendered document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDocument {
    #[serde(default)]
    pub head: Vec<StyleElement>,
    pub body: ViewNode,
}

impl ViewDocument {
    pub fn new(body: ViewNode) -> Self {
        Self {
            head: Vec::new(),
            body,
        }
    }

    pub fn find(&self, id: &str) -> Option<&ViewNode> {
        self.body.find(id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut ViewNode> {
        self.body.find_mut(id)
    }

    pub fn style_element(&self, id: &str) -> Option<&StyleElement> {
        self.head.iter().find(|s| s.id == id)
    }
}
