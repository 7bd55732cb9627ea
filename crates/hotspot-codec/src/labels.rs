//! Enum tables and display labels for filter values.
//!
//! Games publish their enum definitions once per stream. Tracked integer
//! fields that name an enum (`enum_key`) are labelled with enum value names
//! instead of raw numbers in the filter UI.

use std::collections::BTreeMap;

use hotspot_types::{EnumStyle, FieldDef, Value};
use serde::{Deserialize, Serialize};

/// One named enum value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// Value name.
    pub name: String,
    /// Numeric value.
    pub value: i64,
}

/// An enum definition as published by the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    /// Enum name referenced by `enum_key`.
    pub enum_name: String,
    /// Declared values.
    pub values: Vec<EnumValue>,
}

/// All enum definitions known for the active stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumTable {
    enums: BTreeMap<String, Vec<EnumValue>>,
}

impl EnumTable {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            enums: BTreeMap::new(),
        }
    }

    /// Add or replace an enum. Values are kept sorted by name.
    pub fn insert(&mut self, def: EnumDef) {
        let mut values = def.values;
        values.sort_by(|a, b| a.name.cmp(&b.name));
        self.enums.insert(def.enum_name, values);
    }

    /// Values of a named enum.
    pub fn get(&self, enum_name: &str) -> Option<&[EnumValue]> {
        self.enums.get(enum_name).map(Vec::as_slice)
    }

    /// Number of enums.
    pub fn len(&self) -> usize {
        self.enums.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }

    /// Display label for a field value.
    ///
    /// Falls back to the value's natural display when the field names no
    /// enum, the enum is unknown, or no enum value matches.
    pub fn label(&self, field: &FieldDef, value: &Value) -> String {
        let named = field
            .enum_key
            .as_deref()
            .and_then(|key| self.get(key))
            .zip(value.as_i64())
            .and_then(|(values, n)| match field.enum_style {
                EnumStyle::Single => values.iter().find(|v| v.value == n).map(|v| v.name.clone()),
                EnumStyle::Flags => join_matching(values, |v| v.value != 0 && n & v.value == v.value),
                EnumStyle::Indexed => join_matching(values, |v| {
                    u32::try_from(v.value)
                        .ok()
                        .and_then(|bit| 1_i64.checked_shl(bit))
                        .is_some_and(|mask| n & mask != 0)
                }),
            });
        named.unwrap_or_else(|| value.to_string())
    }
}

fn join_matching(values: &[EnumValue], keep: impl Fn(&EnumValue) -> bool) -> Option<String> {
    let names: Vec<&str> = values
        .iter()
        .filter(|v| keep(v))
        .map(|v| v.name.as_str())
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotspot_types::FieldKind;

    fn table() -> EnumTable {
        let mut table = EnumTable::new();
        table.insert(EnumDef {
            enum_name: "Weapon".to_owned(),
            values: vec![
                EnumValue { name: "Shotgun".to_owned(), value: 2 },
                EnumValue { name: "Rifle".to_owned(), value: 1 },
                EnumValue { name: "Rocket".to_owned(), value: 4 },
            ],
        });
        table
    }

    fn field(style: EnumStyle) -> FieldDef {
        FieldDef {
            name: "weapon".to_owned(),
            kind: FieldKind::Int,
            tracked: true,
            enum_key: Some("Weapon".to_owned()),
            enum_style: style,
        }
    }

    #[test]
    fn single_style_uses_matching_name() {
        assert_eq!(table().label(&field(EnumStyle::Single), &Value::Int(2)), "Shotgun");
        assert_eq!(table().label(&field(EnumStyle::Single), &Value::Int(9)), "9");
    }

    #[test]
    fn flags_style_joins_set_bits() {
        let label = table().label(&field(EnumStyle::Flags), &Value::Int(5));
        assert_eq!(label, "Rifle | Rocket");
    }

    #[test]
    fn indexed_style_treats_values_as_bit_positions() {
        // Bit 1 and bit 2 set: Rifle (1) and Shotgun (2).
        let label = table().label(&field(EnumStyle::Indexed), &Value::Int(0b110));
        assert_eq!(label, "Rifle | Shotgun");
    }

    #[test]
    fn unknown_enum_falls_back_to_display() {
        let mut f = field(EnumStyle::Single);
        f.enum_key = Some("Team".to_owned());
        assert_eq!(table().label(&f, &Value::Int(1)), "1");
        assert_eq!(EnumTable::new().label(&f, &Value::Text("red".to_owned())), "red");
    }
}
