//! Audio and control buses.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationRate {
    Audio,
    Control,
}

/// A reference to a bus or bus-group slot, as bound into a node parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusRef {
    pub id: BusId,
    pub calculation_rate: CalculationRateTag,
}

/// Mirrors `CalculationRate` but is `Eq`/`Hash`/`Ord`-friendly for use as a
/// map key alongside `BusId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CalculationRateTag {
    Audio,
    Control,
}

impl From<CalculationRate> for CalculationRateTag {
    fn from(rate: CalculationRate) -> Self {
        match rate {
            CalculationRate::Audio => CalculationRateTag::Audio,
            CalculationRate::Control => CalculationRateTag::Control,
        }
    }
}

/// A contiguous block of buses sharing a calculation rate.
#[derive(Debug, Clone)]
pub struct BusGroup {
    pub lead_session_id: u32,
    pub calculation_rate: CalculationRate,
    pub bus_session_ids: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct Bus {
    pub session_id: u32,
    pub calculation_rate: CalculationRate,
    pub bus_group_lead: Option<u32>,
    /// Ordered `(offset, value)` writes, only meaningful for control buses.
    pub events: Vec<(crate::offset::Offset, f32)>,
}

impl Bus {
    pub fn new(session_id: u32, calculation_rate: CalculationRate) -> Self {
        Bus {
            session_id,
            calculation_rate,
            bus_group_lead: None,
            events: Vec::new(),
        }
    }

    pub fn write(&mut self, offset: crate::offset::Offset, value: f32) {
        self.events.push((offset, value));
    }
}
