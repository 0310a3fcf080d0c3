use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit prices for one model, expressed in USD per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub model: String,
    pub input_price_per_mtok: Decimal,
    pub output_price_per_mtok: Decimal,
}

/// Discount multiplier for one membership level. Applied to billed token
/// counts and the quota amount alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDiscount {
    pub level: String,
    pub multiplier: Decimal,
}

/// The single canonical pricing table. Model rows override the default
/// prices; unknown membership levels pay the full rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    pub default_input_price_per_mtok: Decimal,
    pub default_output_price_per_mtok: Decimal,
    #[serde(default)]
    pub models: Vec<ModelPrice>,
    #[serde(default)]
    pub discounts: Vec<LevelDiscount>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            default_input_price_per_mtok: Decimal::new(125, 2),
            default_output_price_per_mtok: Decimal::new(1000, 2),
            models: Vec::new(),
            discounts: vec![
                LevelDiscount {
                    level: "lite".to_string(),
                    multiplier: Decimal::ONE,
                },
                LevelDiscount {
                    level: "pro".to_string(),
                    multiplier: Decimal::new(90, 2),
                },
                LevelDiscount {
                    level: "team".to_string(),
                    multiplier: Decimal::new(85, 2),
                },
            ],
        }
    }
}

impl PricingTable {
    /// (input, output) USD-per-million prices for a model.
    pub fn price_for(&self, model: Option<&str>) -> (Decimal, Decimal) {
        if let Some(model) = model
            && let Some(row) = self.models.iter().find(|row| row.model == model)
        {
            return (row.input_price_per_mtok, row.output_price_per_mtok);
        }
        (
            self.default_input_price_per_mtok,
            self.default_output_price_per_mtok,
        )
    }

    pub fn discount_for(&self, level: &str) -> Decimal {
        self.discounts
            .iter()
            .find(|row| row.level.eq_ignore_ascii_case(level))
            .map(|row| row.multiplier)
            .unwrap_or(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_row_overrides_default() {
        let mut table = PricingTable::default();
        table.models.push(ModelPrice {
            model: "gpt-large".to_string(),
            input_price_per_mtok: Decimal::new(250, 2),
            output_price_per_mtok: Decimal::new(2000, 2),
        });
        assert_eq!(
            table.price_for(Some("gpt-large")).0,
            Decimal::new(250, 2)
        );
        assert_eq!(table.price_for(Some("other")).0, Decimal::new(125, 2));
        assert_eq!(table.price_for(None).1, Decimal::new(1000, 2));
    }

    #[test]
    fn unknown_level_pays_full_rate() {
        let table = PricingTable::default();
        assert_eq!(table.discount_for("pro"), Decimal::new(90, 2));
        assert_eq!(table.discount_for("enterprise"), Decimal::ONE);
    }
}
