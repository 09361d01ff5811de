//! Shop catalog - the templates a player can arm and place

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::{Cell, Rect};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Prop,
    Enclosure,
    Animal,
}

/// Widest footprint a template may declare; grid coordinates are `i32`.
pub const MAX_TEMPLATE_SIDE: u32 = i32::MAX as u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateShape {
    Prop { width: u32, height: u32 },
    /// Outer size including the fence ring.
    Enclosure { width: u32, height: u32 },
    Animal { species: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub cost: u64,
    #[serde(default)]
    pub income_rate: u64,
    pub shape: TemplateShape,
}

impl Template {
    pub fn prop(id: &str, name: &str, width: u32, height: u32, cost: u64, income_rate: u64) -> Self {
        Self {
            id: TemplateId::new(id),
            name: name.to_string(),
            cost,
            income_rate,
            shape: TemplateShape::Prop { width, height },
        }
    }

    pub fn enclosure(id: &str, name: &str, width: u32, height: u32, cost: u64) -> Self {
        Self {
            id: TemplateId::new(id),
            name: name.to_string(),
            cost,
            income_rate: 0,
            shape: TemplateShape::Enclosure { width, height },
        }
    }

    pub fn animal(id: &str, species: &str, cost: u64, income_rate: u64) -> Self {
        Self {
            id: TemplateId::new(id),
            name: species.to_string(),
            cost,
            income_rate,
            shape: TemplateShape::Animal {
                species: species.to_string(),
            },
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self.shape {
            TemplateShape::Prop { .. } => EntityKind::Prop,
            TemplateShape::Enclosure { .. } => EntityKind::Enclosure,
            TemplateShape::Animal { .. } => EntityKind::Animal,
        }
    }

    /// Rectangle covered when anchored at `anchor`. Animals cover their own
    /// cell only.
    pub fn bounds_at(&self, anchor: Cell) -> Rect {
        match self.shape {
            TemplateShape::Prop { width, height } | TemplateShape::Enclosure { width, height } => {
                Rect::at(anchor, width, height)
            }
            TemplateShape::Animal { .. } => Rect::at(anchor, 1, 1),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.shape {
            TemplateShape::Prop { width, height } | TemplateShape::Enclosure { width, height }
                if width > MAX_TEMPLATE_SIDE || height > MAX_TEMPLATE_SIDE =>
            {
                Err(format!(
                    "template '{}' is larger than {MAX_TEMPLATE_SIDE} cells on a side",
                    self.id
                ))
            }
            TemplateShape::Prop { width, height } if width == 0 || height == 0 => Err(format!(
                "prop template '{}' must cover at least one cell",
                self.id
            )),
            TemplateShape::Enclosure { width, height } if width < 3 || height < 3 => Err(format!(
                "enclosure template '{}' needs at least 3x3 cells to leave an interior",
                self.id
            )),
            TemplateShape::Animal { ref species } if species.trim().is_empty() => Err(format!(
                "animal template '{}' must name a species",
                self.id
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    templates: BTreeMap<TemplateId, Template>,
}

impl Catalog {
    pub fn new(templates: impl IntoIterator<Item = Template>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.id.clone(), template))
                .collect(),
        }
    }

    /// Starter shop used when a scenario does not define its own.
    pub fn standard() -> Self {
        Self::new([
            Template::prop("well", "Well", 1, 1, 100, 2),
            Template::prop("hay_bale", "Hay bale", 1, 1, 20, 0),
            Template::prop("barn", "Barn", 3, 3, 800, 8),
            Template::prop("statue", "Statue", 2, 2, 2_500, 0),
            Template::enclosure("small_pen", "Small pen", 5, 5, 300),
            Template::enclosure("long_pen", "Long pen", 5, 6, 360),
            Template::animal("sheep", "sheep", 150, 5),
            Template::animal("rooster", "rooster", 80, 3),
        ])
    }

    pub fn get(&self, id: &TemplateId) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = Catalog::standard();
        assert!(!catalog.is_empty());
        for template in catalog.iter() {
            assert!(template.validate().is_ok(), "{} invalid", template.id);
        }
        let pen = catalog.get(&TemplateId::new("small_pen")).unwrap();
        assert_eq!(pen.kind(), EntityKind::Enclosure);
        assert_eq!(pen.cost, 300);
    }

    #[test]
    fn test_bounds_at_anchor() {
        let barn = Template::prop("barn", "Barn", 3, 2, 10, 0);
        assert_eq!(barn.bounds_at(Cell::new(4, 1)), Rect::new(4, 1, 3, 2));
        let sheep = Template::animal("sheep", "sheep", 150, 5);
        assert_eq!(sheep.bounds_at(Cell::new(7, 7)), Rect::new(7, 7, 1, 1));
    }

    #[test]
    fn test_validate_rejects_degenerate_shapes() {
        assert!(Template::enclosure("pen", "Pen", 2, 5, 1).validate().is_err());
        assert!(Template::prop("dot", "Dot", 0, 1, 1, 0).validate().is_err());
        assert!(Template::animal("ghost", " ", 1, 0).validate().is_err());
        assert!(Template::prop("wide", "Wide", 3_000_000_000, 1, 100, 50)
            .validate()
            .is_err());
        assert!(Template::enclosure("huge", "Huge", 5, u32::MAX, 1).validate().is_err());
    }

    #[test]
    fn test_template_yaml_shape() {
        let yaml = "id: goat\nname: Goat\ncost: 120\nincome_rate: 4\nshape:\n  kind: animal\n  species: goat\n";
        let template: Template = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(template.kind(), EntityKind::Animal);
        assert_eq!(template.income_rate, 4);
    }
}
