// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Material-property constants shared by storage tanks, heat batteries and pipework.

/// Physical properties of water at typical domestic hot-water operating temperatures.
///
/// Treated as constant across the operating range - no component here needs
/// temperature-dependent density/specific-heat correction.
#[derive(Debug, Clone, Copy)]
pub struct MaterialProperties {
    /// kg/litre
    pub density: f32,
    /// kJ/(kg.K)
    pub specific_heat_capacity: f32,
    /// kJ/(kg.K), same quantity expressed per kWh for convenience at call sites
    /// that already work in kWh (storage-tank energy balance).
    pub specific_heat_capacity_kwh: f32,
}

pub const WATER: MaterialProperties = MaterialProperties {
    density: 1.0,
    specific_heat_capacity: 4.184,
    specific_heat_capacity_kwh: 4.184 / 3600.0,
};

impl MaterialProperties {
    /// Energy in kWh to raise `volume` litres by `delta_t` kelvin.
    pub fn volume_energy_content_kwh_k(&self, volume: f32, delta_t: f32) -> f32 {
        volume * self.density * self.specific_heat_capacity_kwh * delta_t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_energy_content_matches_known_value() {
        // 1 litre of water, raised by 1K, holds ~0.001163 kWh
        let e = WATER.volume_energy_content_kwh_k(1.0, 1.0);
        assert!((e - 0.001163).abs() < 1e-5);
    }
}
