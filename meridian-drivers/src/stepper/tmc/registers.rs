//! TMC register map
//!
//! Addresses and bit layouts of the registers the drivers touch, for the
//! three supported chip families. Layouts that differ between families get
//! their own type; the register builders pick the right one by family.
//!
//! Field positions follow the TMC2130, TMC5160 and TMC2209 datasheets.

#![allow(non_camel_case_types)]

use bitfield::bitfield;
use meridian_core::config::{Decay, DriverModel};

/// Register addresses
pub mod reg {
    /// General configuration
    pub const GCONF: u8 = 0x00;
    /// Global status flags
    pub const GSTAT: u8 = 0x01;
    /// Global current scaler (TMC5160 only)
    pub const GLOBAL_SCALER: u8 = 0x0B;
    /// Hold/run current settings
    pub const IHOLD_IRUN: u8 = 0x10;
    /// Power down delay
    pub const TPOWERDOWN: u8 = 0x11;
    /// Upper velocity for stealthChop
    pub const TPWMTHRS: u8 = 0x13;
    /// CoolStep configuration (UART chips)
    pub const COOLCONF_UART: u8 = 0x42;
    /// Chopper configuration
    pub const CHOPCONF: u8 = 0x6C;
    /// CoolStep configuration (SPI chips)
    pub const COOLCONF_SPI: u8 = 0x6D;
    /// Driver status
    pub const DRV_STATUS: u8 = 0x6F;
    /// StealthChop PWM configuration
    pub const PWMCONF: u8 = 0x70;
}

/// Write flag in the address byte
pub const WRITE_FLAG: u8 = 0x80;

/// Address byte for a register write
pub const fn write_address(register: u8) -> u8 {
    register | WRITE_FLAG
}

/// Address byte for a register read
pub const fn read_address(register: u8) -> u8 {
    register & !WRITE_FLAG
}

/// Register layout family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipFamily {
    /// TMC2130 (SPI)
    Tmc2130,
    /// TMC5160 (SPI)
    Tmc5160,
    /// TMC2209 and TMC2226 (UART)
    Tmc2209,
}

impl ChipFamily {
    /// Register family of a driver model, `None` for pin-configured models
    pub fn of(model: DriverModel) -> Option<Self> {
        match model {
            DriverModel::Tmc2130 => Some(ChipFamily::Tmc2130),
            DriverModel::Tmc5160 => Some(ChipFamily::Tmc5160),
            DriverModel::Tmc2209Uart | DriverModel::Tmc2226Uart => Some(ChipFamily::Tmc2209),
            _ => None,
        }
    }

    /// COOLCONF lives at a different address on the UART chips
    pub fn coolconf_address(self) -> u8 {
        match self {
            ChipFamily::Tmc2209 => reg::COOLCONF_UART,
            _ => reg::COOLCONF_SPI,
        }
    }
}

bitfield! {
    /// GCONF for the SPI chips
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct GCONF_SPI(u32);
    impl Debug;
    pub i_scale_analog, set_i_scale_analog: 0;
    pub internal_rsense, set_internal_rsense: 1;
    pub en_pwm_mode, set_en_pwm_mode: 2;
    pub enc_commutation, set_enc_commutation: 3;
    pub shaft, set_shaft: 4;
    pub diag0_error, set_diag0_error: 5;
    pub diag0_otpw, set_diag0_otpw: 6;
    pub diag0_stall, set_diag0_stall: 7;
    pub diag1_stall, set_diag1_stall: 8;
}

bitfield! {
    /// GCONF for the UART chips
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct GCONF_UART(u32);
    impl Debug;
    pub i_scale_analog, set_i_scale_analog: 0;
    pub internal_rsense, set_internal_rsense: 1;
    pub en_spreadcycle, set_en_spreadcycle: 2;
    pub shaft, set_shaft: 3;
    pub index_otpw, set_index_otpw: 4;
    pub index_step, set_index_step: 5;
    pub pdn_disable, set_pdn_disable: 6;
    pub mstep_reg_select, set_mstep_reg_select: 7;
    pub multistep_filt, set_multistep_filt: 8;
}

bitfield! {
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct IHOLD_IRUN(u32);
    impl Debug;
    u8;
    pub ihold, set_ihold: 4, 0;
    pub irun, set_irun: 12, 8;
    pub ihold_delay, set_ihold_delay: 19, 16;
}

bitfield! {
    /// CHOPCONF, common to all families
    ///
    /// Bits 23:20 are `sync` on the TMC2130 and `tpfd` on the TMC5160.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct CHOPCONF(u32);
    impl Debug;
    u8;
    pub toff, set_toff: 3, 0;
    pub hstrt, set_hstrt: 6, 4;
    pub hend, set_hend: 10, 7;
    pub fd3, set_fd3: 11;
    pub disfdcc, set_disfdcc: 12;
    pub rndtf, set_rndtf: 13;
    pub chm, set_chm: 14;
    pub tbl, set_tbl: 16, 15;
    pub vsense, set_vsense: 17;
    pub vhighfs, set_vhighfs: 18;
    pub vhighchm, set_vhighchm: 19;
    pub sync, set_sync: 23, 20;
    pub tpfd, set_tpfd: 23, 20;
    pub mres, set_mres: 27, 24;
    pub intpol, set_intpol: 28;
    pub dedge, set_dedge: 29;
    pub diss2g, set_diss2g: 30;
    pub diss2vs, set_diss2vs: 31;
}

bitfield! {
    /// PWMCONF on the TMC2130
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct PWMCONF_2130(u32);
    impl Debug;
    u8;
    pub pwm_ampl, set_pwm_ampl: 7, 0;
    pub pwm_grad, set_pwm_grad: 15, 8;
    pub pwm_freq, set_pwm_freq: 17, 16;
    pub pwm_autoscale, set_pwm_autoscale: 18;
    pub pwm_symmetric, set_pwm_symmetric: 19;
    pub freewheel, set_freewheel: 21, 20;
}

bitfield! {
    /// PWMCONF on the TMC5160 and TMC2209
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct PWMCONF_5160(u32);
    impl Debug;
    u8;
    pub pwm_ofs, set_pwm_ofs: 7, 0;
    pub pwm_grad, set_pwm_grad: 15, 8;
    pub pwm_freq, set_pwm_freq: 17, 16;
    pub pwm_autoscale, set_pwm_autoscale: 18;
    pub pwm_autograd, set_pwm_autograd: 19;
    pub freewheel, set_freewheel: 21, 20;
    pub pwm_reg, set_pwm_reg: 27, 24;
    pub pwm_lim, set_pwm_lim: 31, 28;
}

bitfield! {
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct COOLCONF(u32);
    impl Debug;
    u8;
    pub semin, set_semin: 3, 0;
    pub seup, set_seup: 6, 5;
    pub semax, set_semax: 11, 8;
    pub sedn, set_sedn: 14, 13;
    pub seimin, set_seimin: 15;
    pub i8, sgt, set_sgt: 22, 16;
    pub sfilt, set_sfilt: 24;
}

bitfield! {
    /// DRV_STATUS on the SPI chips
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct DRV_STATUS_SPI(u32);
    impl Debug;
    u16;
    pub sg_result, _: 9, 0;
    pub fsactive, _: 15;
    u8;
    pub cs_actual, _: 21, 16;
    pub stallguard, _: 24;
    pub ot, _: 25;
    pub otpw, _: 26;
    pub s2ga, _: 27;
    pub s2gb, _: 28;
    pub ola, _: 29;
    pub olb, _: 30;
    pub stst, _: 31;
}

bitfield! {
    /// DRV_STATUS on the UART chips
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct DRV_STATUS_UART(u32);
    impl Debug;
    u8;
    pub otpw, _: 0;
    pub ot, _: 1;
    pub s2ga, _: 2;
    pub s2gb, _: 3;
    pub s2vsa, _: 4;
    pub s2vsb, _: 5;
    pub ola, _: 6;
    pub olb, _: 7;
    pub t120, _: 8;
    pub t143, _: 9;
    pub t150, _: 10;
    pub t157, _: 11;
    pub cs_actual, _: 20, 16;
    pub stealth, _: 30;
    pub stst, _: 31;
}

bitfield! {
    /// SPI_STATUS byte returned with every SPI reply
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct SPI_STATUS(u8);
    impl Debug;
    pub reset_flag, _: 0;
    pub driver_error, _: 1;
    pub sg2, _: 2;
    pub standstill, _: 3;
}

/// Hold delay written to IHOLD_IRUN
pub const IHOLD_DELAY: u8 = 6;

/// Power-down delay after the last step (about 0.4 s)
pub const TPOWERDOWN_VALUE: u32 = 20;

/// GCONF selecting a decay mode
pub fn gconf(family: ChipFamily, decay: Decay) -> u32 {
    let stealth = decay == Decay::StealthChop;
    match family {
        ChipFamily::Tmc2130 | ChipFamily::Tmc5160 => {
            let mut gconf = GCONF_SPI(0);
            gconf.set_i_scale_analog(true);
            gconf.set_en_pwm_mode(stealth);
            gconf.0
        }
        ChipFamily::Tmc2209 => {
            let mut gconf = GCONF_UART(0);
            gconf.set_en_spreadcycle(!stealth);
            gconf.set_pdn_disable(true);
            gconf.set_mstep_reg_select(true);
            gconf.set_multistep_filt(true);
            gconf.0
        }
    }
}

/// CHOPCONF with everything but the microstep resolution
pub fn chopconf_base(family: ChipFamily) -> CHOPCONF {
    let mut chopconf = CHOPCONF(0);
    chopconf.set_intpol(true);
    match family {
        ChipFamily::Tmc2130 => {
            chopconf.set_toff(4);
            chopconf.set_hstrt(5);
            chopconf.set_hend(3);
            chopconf.set_tbl(1);
        }
        ChipFamily::Tmc5160 => {
            chopconf.set_toff(3);
            chopconf.set_hstrt(4);
            chopconf.set_hend(1);
            chopconf.set_tbl(2);
            chopconf.set_tpfd(4);
        }
        ChipFamily::Tmc2209 => {
            chopconf.set_toff(5);
            chopconf.set_hstrt(4);
            chopconf.set_hend(0);
            chopconf.set_tbl(2);
        }
    }
    chopconf
}

/// CHOPCONF for a microstep resolution code
pub fn chopconf(base: CHOPCONF, mres: u8) -> u32 {
    let mut chopconf = base;
    chopconf.set_mres(mres);
    chopconf.0
}

/// IHOLD_IRUN for the given current scale values
pub fn ihold_irun(ihold: u8, irun: u8) -> u32 {
    let mut value = IHOLD_IRUN(0);
    value.set_ihold(ihold);
    value.set_irun(irun);
    value.set_ihold_delay(IHOLD_DELAY);
    value.0
}

/// PWMCONF for stealthChop
pub fn pwmconf(family: ChipFamily) -> u32 {
    match family {
        ChipFamily::Tmc2130 => {
            let mut pwm = PWMCONF_2130(0);
            pwm.set_pwm_ampl(200);
            pwm.set_pwm_grad(1);
            pwm.set_pwm_freq(1);
            pwm.set_pwm_autoscale(true);
            pwm.0
        }
        ChipFamily::Tmc5160 => {
            let mut pwm = PWMCONF_5160(0);
            pwm.set_pwm_ofs(30);
            pwm.set_pwm_grad(0);
            pwm.set_pwm_freq(0);
            pwm.set_pwm_autoscale(true);
            pwm.set_pwm_autograd(true);
            pwm.set_pwm_reg(4);
            pwm.set_pwm_lim(12);
            pwm.0
        }
        ChipFamily::Tmc2209 => {
            let mut pwm = PWMCONF_5160(0);
            pwm.set_pwm_ofs(36);
            pwm.set_pwm_grad(14);
            pwm.set_pwm_freq(1);
            pwm.set_pwm_autoscale(true);
            pwm.set_pwm_autograd(true);
            pwm.set_pwm_reg(4);
            pwm.set_pwm_lim(12);
            pwm.0
        }
    }
}

/// COOLCONF: coolStep off, stallGuard threshold centred, filtered
pub fn coolconf() -> u32 {
    let mut cool = COOLCONF(0);
    cool.set_semin(0);
    cool.set_sgt(0);
    cool.set_sfilt(true);
    cool.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        assert_eq!(write_address(reg::GCONF), 0x80);
        assert_eq!(write_address(reg::CHOPCONF), 0xEC);
        assert_eq!(read_address(0xEF), reg::DRV_STATUS);
    }

    #[test]
    fn test_gconf_spi() {
        assert_eq!(gconf(ChipFamily::Tmc2130, Decay::SpreadCycle), 0b001);
        assert_eq!(gconf(ChipFamily::Tmc5160, Decay::StealthChop), 0b101);
    }

    #[test]
    fn test_gconf_uart_inverts_chopper_bit() {
        let spread = gconf(ChipFamily::Tmc2209, Decay::SpreadCycle);
        let stealth = gconf(ChipFamily::Tmc2209, Decay::StealthChop);
        assert_eq!(spread, 0x1C4);
        assert_eq!(stealth, 0x1C0);
    }

    #[test]
    fn test_ihold_irun_layout() {
        assert_eq!(ihold_irun(5, 10), 0x0006_0A05);
        // Values are masked to their field width
        assert_eq!(ihold_irun(31, 31) & 0xFFFF, 0x1F1F);
    }

    #[test]
    fn test_chopconf_mres_merge() {
        let base = chopconf_base(ChipFamily::Tmc2209);
        // toff 5, hstrt 4, tbl 2, intpol
        assert_eq!(base.0, 0x1001_0045);
        assert_eq!(chopconf(base, 4), 0x1401_0045);
        assert_eq!(chopconf(base, 0) >> 24 & 0xF, 0);

        let base = chopconf_base(ChipFamily::Tmc5160);
        assert_eq!(base.tpfd(), 4);
        assert_eq!(chopconf(base, 8) >> 24 & 0xF, 8);
    }

    #[test]
    fn test_pwmconf_layouts() {
        // ofs 36, grad 14, freq 1, autoscale, autograd, reg 4, lim 12
        assert_eq!(pwmconf(ChipFamily::Tmc2209), 0xC40D_0E24);
        let pwm = PWMCONF_2130(pwmconf(ChipFamily::Tmc2130));
        assert_eq!(pwm.pwm_ampl(), 200);
        assert!(pwm.pwm_autoscale());
        assert!(!pwm.pwm_symmetric());
    }

    #[test]
    fn test_drv_status_spi_fields() {
        let status = DRV_STATUS_SPI(0x8A1F_81FF);
        assert!(status.stst());
        assert!(status.s2ga());
        assert!(status.ot());
        assert!(!status.olb());
        assert_eq!(status.cs_actual(), 0x1F);
        assert!(status.fsactive());
        assert_eq!(status.sg_result(), 0x1FF);
    }

    #[test]
    fn test_drv_status_uart_fields() {
        let status = DRV_STATUS_UART(0x8010_00C3);
        assert!(status.stst());
        assert!(status.otpw());
        assert!(status.ot());
        assert!(status.ola());
        assert!(status.olb());
        assert!(!status.s2ga());
        assert_eq!(status.cs_actual(), 0x10);
    }

    #[test]
    fn test_coolconf_address() {
        assert_eq!(ChipFamily::Tmc2130.coolconf_address(), 0x6D);
        assert_eq!(ChipFamily::Tmc2209.coolconf_address(), 0x42);
        assert_eq!(coolconf(), 1 << 24);
    }
}
