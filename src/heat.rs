use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SetupError;

pub const DEFAULT_DISTANCES: [&str; 5] = ["15 m", "25 m", "50 m", "100 m", "200 m"];
pub const DEFAULT_STROKES: [&str; 4] = ["Butterfly", "Backstroke", "Breaststroke", "Freestyle"];

/// Swimmers per heat, one per number key on the heat screen
pub const MAX_HEAT_SWIMMERS: usize = 9;

/// Who swims, how far, and with which stroke. Fixed for the lifetime of a timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatConfiguration {
    pub roster: Vec<String>,
    pub distance: String,
    pub strokes: HashMap<String, String>,
}

impl HeatConfiguration {
    /// Repeated roster names are kept once, at their first position.
    pub fn new(roster: Vec<String>, distance: impl Into<String>, strokes: HashMap<String, String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(roster.len());
        for name in roster {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self {
            roster: unique,
            distance: distance.into(),
            strokes,
        }
    }

    /// Stroke assigned to a swimmer, empty when the setup never picked one
    pub fn stroke_for(&self, swimmer: &str) -> &str {
        self.strokes.get(swimmer).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, swimmer: &str) -> bool {
        self.roster.iter().any(|s| s == swimmer)
    }
}

/// A saved heat setup that can be loaded back into a [`HeatSetup`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatPreset {
    pub distance: String,
    pub swimmers: Vec<String>,
    pub strokes: HashMap<String, String>,
}

impl From<&HeatConfiguration> for HeatPreset {
    fn from(cfg: &HeatConfiguration) -> Self {
        Self {
            distance: cfg.distance.clone(),
            swimmers: cfg.roster.clone(),
            strokes: cfg.strokes.clone(),
        }
    }
}

/// Selection state used to put a heat together before the clock starts
#[derive(Debug, Clone)]
pub struct HeatSetup {
    distances: Vec<String>,
    stroke_options: Vec<String>,
    selected: Vec<String>,
    distance: Option<String>,
    strokes: HashMap<String, String>,
}

impl Default for HeatSetup {
    fn default() -> Self {
        Self::new(
            DEFAULT_DISTANCES.iter().map(|d| d.to_string()).collect(),
            DEFAULT_STROKES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl HeatSetup {
    pub fn new(distances: Vec<String>, stroke_options: Vec<String>) -> Self {
        Self {
            distances,
            stroke_options,
            selected: Vec::new(),
            distance: None,
            strokes: HashMap::new(),
        }
    }

    pub fn distances(&self) -> &[String] {
        &self.distances
    }

    pub fn stroke_options(&self) -> &[String] {
        &self.stroke_options
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn distance(&self) -> Option<&str> {
        self.distance.as_deref()
    }

    /// Select a swimmer, or deselect one that is already in the heat.
    /// Returns whether the swimmer is selected afterwards.
    pub fn toggle_swimmer(&mut self, swimmer: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|s| s == swimmer) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(swimmer.to_string());
            true
        }
    }

    pub fn select_distance(&mut self, distance: &str) -> Result<(), SetupError> {
        if !self.distances.iter().any(|d| d == distance) {
            return Err(SetupError::UnknownDistance(distance.to_string()));
        }
        self.distance = Some(distance.to_string());
        Ok(())
    }

    pub fn select_stroke(&mut self, swimmer: &str, stroke: &str) -> Result<(), SetupError> {
        if !self.selected.iter().any(|s| s == swimmer) {
            return Err(SetupError::SwimmerNotSelected(swimmer.to_string()));
        }
        if !self.stroke_options.iter().any(|s| s == stroke) {
            return Err(SetupError::UnknownStroke(stroke.to_string()));
        }
        self.strokes.insert(swimmer.to_string(), stroke.to_string());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.distance = None;
        self.strokes.clear();
    }

    /// Replace the current selection with a preset. Strokes of swimmers that
    /// are not part of the preset roster are dropped.
    pub fn load_preset(&mut self, preset: &HeatPreset) -> Result<(), SetupError> {
        self.clear();
        for swimmer in &preset.swimmers {
            if !self.selected.contains(swimmer) {
                self.selected.push(swimmer.clone());
            }
        }
        self.select_distance(&preset.distance)?;
        for (swimmer, stroke) in &preset.strokes {
            if self.selected.contains(swimmer) {
                self.select_stroke(swimmer, stroke)?;
            }
        }
        Ok(())
    }

    pub fn to_preset(&self) -> Result<HeatPreset, SetupError> {
        self.build().map(|cfg| HeatPreset::from(&cfg))
    }

    pub fn build(&self) -> Result<HeatConfiguration, SetupError> {
        if self.selected.is_empty() {
            return Err(SetupError::EmptyRoster);
        }
        if self.selected.len() > MAX_HEAT_SWIMMERS {
            return Err(SetupError::TooManySwimmers {
                selected: self.selected.len(),
                max: MAX_HEAT_SWIMMERS,
            });
        }
        let distance = self.distance.clone().ok_or(SetupError::MissingDistance)?;
        let strokes = self
            .strokes
            .iter()
            .filter(|(swimmer, _)| self.selected.contains(swimmer))
            .map(|(swimmer, stroke)| (swimmer.clone(), stroke.clone()))
            .collect();
        Ok(HeatConfiguration::new(self.selected.clone(), distance, strokes))
    }
}
