/// On-demand hourly prices in USD for us-east-1 hosting instances.
const INSTANCE_PRICES: &[(&str, f64)] = &[
    ("ml.g4dn.xlarge", 0.736),
    ("ml.g4dn.2xlarge", 0.94),
    ("ml.g4dn.4xlarge", 1.505),
    ("ml.g5.xlarge", 1.408),
    ("ml.g5.2xlarge", 1.515),
    ("ml.g5.4xlarge", 2.03),
    ("ml.g5.8xlarge", 3.06),
    ("ml.p3.2xlarge", 3.825),
    ("ml.p3.8xlarge", 14.688),
    ("ml.p3.16xlarge", 28.152),
];

/// Used for instance types missing from the table.
pub const FALLBACK_HOURLY_PRICE: f64 = 2.0;

pub fn hourly_price(instance_type: &str) -> f64 {
    INSTANCE_PRICES
        .iter()
        .find(|(name, _)| *name == instance_type)
        .map(|(_, price)| *price)
        .unwrap_or(FALLBACK_HOURLY_PRICE)
}
