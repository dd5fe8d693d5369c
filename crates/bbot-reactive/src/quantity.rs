//! Unit-aware formatting for measured values.
//!
//! A [`QuantityKind`] names a physical quantity and carries an ordered unit
//! table. Formatting picks the unit that renders a value in the fewest
//! characters, which matters on the small displays and log lines these
//! readings end up on. [`QuantityCell`] pairs a kind with a reactive cell so
//! sensor drivers publish raw basal-unit numbers and display code asks for
//! strings.

use web_time::Duration;

use bbot_core::Scheduler;

use crate::error::QuantityError;
use crate::value::ReactiveValue;

/// One display unit: a suffix and its multiplier relative to the basal unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    suffix: String,
    multiplier: f64,
}

impl Unit {
    #[must_use]
    pub fn new(suffix: impl Into<String>, multiplier: f64) -> Self {
        Self {
            suffix: suffix.into(),
            multiplier,
        }
    }

    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

/// Width score of a rendered number: digits left of the dot, plus the dot
/// and the leading-zero run right of it. Lower reads shorter. Zero is free,
/// anything unrenderable scores 1000.
fn width_penalty(value: f64) -> u32 {
    if value == 0.0 {
        return 0;
    }
    let magnitude = value.abs();
    if magnitude >= 1.0 {
        for digits in 1..99_i32 {
            if magnitude / 10f64.powi(digits) < 1.0 {
                let mut fraction = width_penalty(magnitude.fract()) / 10;
                if fraction > 0 {
                    fraction += 1; // the dot
                }
                return digits as u32 + fraction;
            }
        }
    } else {
        for scan in 1..99_i32 {
            if magnitude * f64::from(scan) * 10.0 > 1.0 {
                return scan as u32 * 10;
            }
        }
    }
    1000
}

/// Render with at most `precision` significant digits, trailing zeros
/// trimmed. Falls back to exponential notation outside the range fixed
/// point renders compactly.
fn format_significant(value: f64, precision: u32) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let digits = precision.max(1) as usize;
    let sci = format!("{:.*e}", digits - 1, value);
    let Some((mantissa, exp_str)) = sci.split_once('e') else {
        // inf and NaN carry no exponent
        return sci;
    };
    let Ok(exponent) = exp_str.parse::<i32>() else {
        return sci;
    };
    if exponent < -4 || exponent >= digits as i32 {
        return format!("{}e{exponent}", trim_fraction(mantissa));
    }
    let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
    let fixed = format!("{value:.decimals$}");
    trim_fraction(&fixed).to_string()
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn joined(text: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        text.to_string()
    } else {
        format!("{text} {suffix}")
    }
}

/// A measured quantity: display name, ordered unit table, precision.
///
/// Units are tried in declaration order and the first one with the lowest
/// width penalty wins, so list the preferred unit before equally-wide
/// alternatives.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityKind {
    name: String,
    units: Vec<Unit>,
    precision: u32,
}

impl QuantityKind {
    /// A kind with the default precision of four significant digits.
    #[must_use]
    pub fn new(name: impl Into<String>, units: Vec<Unit>) -> Self {
        Self {
            name: name.into(),
            units,
            precision: 4,
        }
    }

    #[must_use]
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Override the display name, e.g. to tell two voltage rails apart.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Multiplier of the unit with this exact suffix.
    #[must_use]
    pub fn multiplier_for(&self, suffix: &str) -> Option<f64> {
        self.units
            .iter()
            .find(|unit| unit.suffix == suffix)
            .map(Unit::multiplier)
    }

    fn basal_suffix(&self) -> &str {
        self.units
            .iter()
            .find(|unit| unit.multiplier == 1.0)
            .map_or("", Unit::suffix)
    }

    /// Best unit rendering plus the basal-unit rendering when one exists.
    fn render_candidates(&self, value: f64) -> (String, &str, Option<String>) {
        if value == 0.0 {
            return ("0".to_string(), self.basal_suffix(), None);
        }
        let mut best_penalty = u32::MAX;
        let mut best_text = String::new();
        let mut best_suffix = "";
        let mut basal_text = None;
        for unit in &self.units {
            let scaled = value / unit.multiplier;
            let penalty = width_penalty(scaled);
            if penalty < best_penalty || unit.multiplier == 1.0 {
                let text = format_significant(scaled, self.precision);
                if unit.multiplier == 1.0 {
                    basal_text = Some(text.clone());
                }
                if penalty < best_penalty {
                    best_penalty = penalty;
                    best_text = text;
                    best_suffix = &unit.suffix;
                }
            }
        }
        (best_text, best_suffix, basal_text)
    }

    /// `value` rendered in its narrowest unit, e.g. `3.3 V` or `20 mA`.
    #[must_use]
    pub fn format(&self, value: f64) -> String {
        let (text, suffix, basal) = self.render_candidates(value);
        if text.contains('e') {
            // exponential notation reads better against the basal unit
            if let Some(basal) = basal {
                return joined(&basal, self.basal_suffix());
            }
        }
        joined(&text, suffix)
    }

    /// Like [`format`](Self::format) but squeezed into `width` characters
    /// for fixed-size displays. Right-aligns when there is room, then drops
    /// the space, then the unit, then precision. A zero width means no
    /// limit.
    #[must_use]
    pub fn format_fitted(&self, value: f64, width: usize) -> String {
        if width == 0 {
            return self.format(value);
        }
        let (text, suffix, basal) = self.render_candidates(value);
        let spaced = joined(&text, suffix);
        let spaced_width = spaced.chars().count();
        if width >= spaced_width {
            return format!("{}{spaced}", " ".repeat(width - spaced_width));
        }
        let text_width = text.chars().count();
        let suffix_width = suffix.chars().count();
        if width >= text_width + suffix_width {
            return format!("{text}{suffix}");
        }
        if let Some(basal) = &basal {
            if basal.chars().count() <= width {
                return basal.clone();
            }
        }
        let keep = width.saturating_sub(suffix_width);
        let truncated: String = text.chars().take(keep).collect();
        format!("{truncated}{suffix}")
    }

    /// `name: value unit`, the long form for logs and status lines.
    #[must_use]
    pub fn format_labeled(&self, value: f64) -> String {
        format!("{}: {}", self.name, self.format(value))
    }

    // ─── Built-in kinds ───

    /// Voltage, tagged `U` in the electrical convention.
    #[must_use]
    pub fn voltage() -> Self {
        Self::new(
            "U",
            vec![
                Unit::new("kV", 1e3),
                Unit::new("V", 1.0),
                Unit::new("mV", 1e-3),
                Unit::new("uV", 1e-6),
            ],
        )
    }

    /// Current, tagged `I`.
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            "I",
            vec![
                Unit::new("kA", 1e3),
                Unit::new("A", 1.0),
                Unit::new("mA", 1e-3),
                Unit::new("uA", 1e-6),
            ],
        )
    }

    /// Temperature in degrees Celsius.
    #[must_use]
    pub fn temperature() -> Self {
        Self::new("T", vec![Unit::new("\u{b0}C", 1.0)])
    }

    /// Pressure in pascals.
    #[must_use]
    pub fn pressure() -> Self {
        Self::new(
            "P",
            vec![
                Unit::new("kPa", 1e3),
                Unit::new("hPa", 1e2),
                Unit::new("Pa", 1.0),
            ],
        )
    }

    /// Relative humidity as a percentage.
    #[must_use]
    pub fn relative_humidity() -> Self {
        Self::new("RH", vec![Unit::new("%", 1.0)])
    }

    /// Length in meters.
    #[must_use]
    pub fn length() -> Self {
        Self::new(
            "l",
            vec![
                Unit::new("km", 1e3),
                Unit::new("m", 1.0),
                Unit::new("cm", 1e-2),
                Unit::new("mm", 1e-3),
                Unit::new("um", 1e-6),
            ],
        )
    }

    /// Plane angle in degrees.
    #[must_use]
    pub fn angle() -> Self {
        Self::new("Ang", vec![Unit::new("\u{b0}", 1.0)])
    }

    /// Speed in kilometers per hour.
    #[must_use]
    pub fn speed() -> Self {
        Self::new("v", vec![Unit::new("km/h", 1.0)])
    }
}

/// A reactive cell that knows how to print itself.
///
/// The cell always stores basal-unit values; [`set_scaled`](Self::set_scaled)
/// converts on the way in. Listener registration goes through
/// [`cell`](Self::cell).
#[derive(Debug, Clone)]
pub struct QuantityCell {
    cell: ReactiveValue<f64>,
    kind: QuantityKind,
}

impl QuantityCell {
    #[must_use]
    pub fn new(scheduler: &Scheduler, kind: QuantityKind, initial: f64) -> Self {
        Self {
            cell: ReactiveValue::new(scheduler, initial),
            kind,
        }
    }

    /// A quantity backed by a periodic refresh source, typically a sensor
    /// driver read.
    #[must_use]
    pub fn with_refresh(
        scheduler: &Scheduler,
        kind: QuantityKind,
        initial: f64,
        period: Duration,
        refresh: impl FnMut() -> Option<f64> + 'static,
    ) -> Self {
        Self {
            cell: ReactiveValue::with_refresh(scheduler, initial, period, refresh),
            kind,
        }
    }

    #[must_use]
    pub fn cell(&self) -> &ReactiveValue<f64> {
        &self.cell
    }

    #[must_use]
    pub fn kind(&self) -> &QuantityKind {
        &self.kind
    }

    /// Store `value` expressed in the unit with suffix `unit`, converting
    /// to the basal unit.
    pub fn set_scaled(&self, value: f64, unit: &str) -> Result<(), QuantityError> {
        let multiplier = self
            .kind
            .multiplier_for(unit)
            .ok_or_else(|| QuantityError::UnknownUnit {
                unit: unit.to_string(),
            })?;
        self.cell.set(value * multiplier);
        Ok(())
    }

    /// Current value in its narrowest unit.
    #[must_use]
    pub fn format(&self) -> String {
        self.kind.format(self.cell.get())
    }

    /// Current value squeezed into `width` characters.
    #[must_use]
    pub fn format_fitted(&self, width: usize) -> String {
        self.kind.format_fitted(self.cell.get(), width)
    }

    /// `name: value unit` for logs and status lines.
    #[must_use]
    pub fn format_labeled(&self) -> String {
        self.kind.format_labeled(self.cell.get())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
