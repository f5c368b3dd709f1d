//! # Equipment Interface
//!
//! This module defines the data handed to and received from the vehicle's equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod cam;
pub mod car;
pub mod gps;
pub mod imu;
