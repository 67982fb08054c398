//! On-board sensor adapter: battery divider, hall sensor, die temperature.
//!
//! Implements [`SensorPort`]. Each wake takes exactly one reading of each.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: the battery divider is read through the ADC1 oneshot API and
//! the die temperature through the internal temperature-sensor driver. The
//! ESP32-S3 has no hall element, so `hall` is reported as 0.
//! On host/test: values come from static atomics for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicI16, AtomicU16, Ordering};

#[allow(unused_imports)]
use log::{info, warn};

use crate::app::ports::SensorPort;
use crate::scan::SensorSample;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(not(target_os = "espidf"))]
static SIM_BATTERY: AtomicU16 = AtomicU16::new(0xB000);
#[cfg(not(target_os = "espidf"))]
static SIM_HALL: AtomicI16 = AtomicI16::new(0);
#[cfg(not(target_os = "espidf"))]
static SIM_TEMP_F: AtomicI16 = AtomicI16::new(113);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_sample(sample: SensorSample) {
    SIM_BATTERY.store(sample.battery, Ordering::Relaxed);
    SIM_HALL.store(sample.hall, Ordering::Relaxed);
    SIM_TEMP_F.store(sample.temperature, Ordering::Relaxed);
}

/// ADC1 channel wired to the battery divider (GPIO1 on the S3).
pub const BATTERY_ADC_CHANNEL: u32 = 0;

/// Scale a 12-bit conversion to the full `u16` range the frame carries.
pub fn scale_to_u16(raw12: u16) -> u16 {
    let raw12 = raw12.min(0x0FFF);
    (raw12 << 4) | (raw12 >> 8)
}

/// Die temperature in whole degrees Fahrenheit.
pub fn celsius_to_raw(celsius: f32) -> i16 {
    (celsius * 9.0 / 5.0 + 32.0).round() as i16
}

pub struct OnboardSensors {
    #[cfg(target_os = "espidf")]
    adc: adc_oneshot_unit_handle_t,
    #[cfg(target_os = "espidf")]
    temp: temperature_sensor_handle_t,
}

impl OnboardSensors {
    /// Configure ADC1 and the die temperature sensor. Failures are logged
    /// and the affected reading falls back to 0.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        let mut adc: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // SAFETY: called once from main() before the wake cycle starts.
        unsafe {
            if adc_oneshot_new_unit(&init_cfg, &mut adc) != ESP_OK as esp_err_t
                || adc_oneshot_config_channel(adc, BATTERY_ADC_CHANNEL, &chan_cfg)
                    != ESP_OK as esp_err_t
            {
                warn!("Sensors: ADC1 init failed, battery reads 0");
                adc = core::ptr::null_mut();
            }
        }

        let mut temp: temperature_sensor_handle_t = core::ptr::null_mut();
        let temp_cfg = temperature_sensor_config_t {
            range_min: -10,
            range_max: 80,
            ..Default::default()
        };
        unsafe {
            if temperature_sensor_install(&temp_cfg, &mut temp) != ESP_OK as esp_err_t
                || temperature_sensor_enable(temp) != ESP_OK as esp_err_t
            {
                warn!("Sensors: temperature sensor init failed");
                temp = core::ptr::null_mut();
            }
        }

        info!("Sensors: ADC1 CH{} battery, die temperature", BATTERY_ADC_CHANNEL);
        Self { adc, temp }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        info!("Sensors(sim): injected readings");
        Self {}
    }

    #[cfg(target_os = "espidf")]
    fn read_battery(&self) -> u16 {
        if self.adc.is_null() {
            return 0;
        }
        let mut raw: i32 = 0;
        let ret = unsafe { adc_oneshot_read(self.adc, BATTERY_ADC_CHANNEL, &mut raw) };
        if ret != ESP_OK as esp_err_t {
            return 0;
        }
        scale_to_u16(raw.clamp(0, 0x0FFF) as u16)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_battery(&self) -> u16 {
        SIM_BATTERY.load(Ordering::Relaxed)
    }

    #[cfg(target_os = "espidf")]
    fn read_hall(&self) -> i16 {
        0
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_hall(&self) -> i16 {
        SIM_HALL.load(Ordering::Relaxed)
    }

    #[cfg(target_os = "espidf")]
    fn read_temperature(&self) -> i16 {
        if self.temp.is_null() {
            return 0;
        }
        let mut celsius: f32 = 0.0;
        let ret = unsafe { temperature_sensor_get_celsius(self.temp, &mut celsius) };
        if ret != ESP_OK as esp_err_t {
            return 0;
        }
        celsius_to_raw(celsius)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_temperature(&self) -> i16 {
        SIM_TEMP_F.load(Ordering::Relaxed)
    }
}

impl Default for OnboardSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for OnboardSensors {
    fn sample(&mut self) -> SensorSample {
        SensorSample {
            battery: self.read_battery(),
            hall: self.read_hall(),
            temperature: self.read_temperature(),
        }
    }
}
