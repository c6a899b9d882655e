//! TMC2130 register manager
//!
//! A non-blocking, per-chip state machine over the TMC2130's 5-byte SPI
//! frame: one address byte (bit 7 set for writes) followed by a 32-bit
//! big-endian payload. Reads are pipelined by one transaction - the
//! response to a frame carries the value of the register requested by
//! the *previous* frame - so collecting a read takes a follow-up frame
//! whose own payload is unused.
//!
//! The manager is sans-io. Queueing an access may hand back a
//! [`Transfer`] to put on the bus; the SPI completion callback feeds
//! the 5 response bytes to [`Tmc2130::transfer_complete`], which
//! decodes them and hands back the next frame if one is due. No buffer
//! is touched while a transfer is in flight.

pub mod registers;

use heapless::Deque;

pub use registers::{
    ChopConf, DrvStatus, GConf, GStat, IholdIrun, Ioin, PwmConf, Reg, CHIP_VERSION, WRITE_BIT,
};

/// Depth of the pending register access queue
pub const ACCESS_QUEUE_DEPTH: usize = 32;

/// Interval between periodic status refreshes, in milliseconds
pub const CHECK_PERIOD_MS: u32 = 100;

/// CHOPCONF starting point applied during init, before the per-field
/// overrides
pub const CHOPCONF_BASELINE: u32 = 0x0301_00C5;

/// A 5-byte frame ready to put on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    /// Address byte plus big-endian payload
    pub tx: [u8; 5],
    /// True when nothing further is expected from this chip and the bus
    /// can be yielded to another device
    pub ends_transaction: bool,
}

/// The pending access queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

/// Register manager for one TMC2130
///
/// The public register fields are the host-order caches: set them
/// before queueing a write, read them after a read completes.
#[derive(Debug, Default)]
pub struct Tmc2130 {
    pub gconf: GConf,
    pub gstat: GStat,
    pub ioin: Ioin,
    pub ihold_irun: IholdIrun,
    pub tpowerdown: u32,
    pub tstep: u32,
    pub tpwmthrs: u32,
    pub tcoolthrs: u32,
    pub thigh: u32,
    pub xdirect: u32,
    pub vdcmin: u32,
    pub mscnt: u32,
    pub chopconf: ChopConf,
    pub coolconf: u32,
    pub drv_status: DrvStatus,
    pub pwmconf: PwmConf,

    /// Register tokens waiting for the bus; bit 7 set means write
    queue: Deque<u8, ACCESS_QUEUE_DEPTH>,
    /// A frame is on the bus; buffers must not be touched
    transmitting: bool,
    /// Register whose value the next response will carry
    pending_read: Option<Reg>,
    /// The frame in flight exists only to collect a pending read
    reading_only: bool,
    /// SPI status byte from the last response
    status: u8,
    /// Outgoing frame buffer
    out: [u8; 5],
    /// Last response received
    response: [u8; 5],
    /// Time since the last periodic refresh
    check_clock_ms: u32,
}

impl Tmc2130 {
    pub fn new() -> Self {
        Self::default()
    }

    /// SPI status byte captured from the most recent response
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Raw bytes of the most recent response
    pub fn last_response(&self) -> [u8; 5] {
        self.response
    }

    /// True when nothing is queued, in flight, or waiting to be
    /// collected
    pub fn is_idle(&self) -> bool {
        !self.transmitting && self.queue.is_empty() && self.pending_read.is_none()
    }

    /// Register whose read is still waiting for its collect frame
    pub fn pending_read(&self) -> Option<Reg> {
        self.pending_read
    }

    /// Queue a register read. Returns a frame if the bus should be
    /// started now.
    pub fn read_register(&mut self, reg: Reg) -> Result<Option<Transfer>, QueueFull> {
        self.queue.push_back(reg.addr()).map_err(|_| QueueFull)?;
        Ok(self.pump())
    }

    /// Queue a register write. The current cache value is marshalled
    /// into the frame when the access reaches the head of the queue.
    pub fn write_register(&mut self, reg: Reg) -> Result<Option<Transfer>, QueueFull> {
        self.queue
            .push_back(reg.addr() | WRITE_BIT)
            .map_err(|_| QueueFull)?;
        Ok(self.pump())
    }

    /// Advance the state machine; emit the next frame if the bus is
    /// free and there is work.
    fn pump(&mut self) -> Option<Transfer> {
        if self.transmitting || (self.queue.is_empty() && self.pending_read.is_none()) {
            return None;
        }
        self.transmitting = true;

        let token = if let Some(token) = self.queue.pop_front() {
            if token & WRITE_BIT != 0 {
                // Snapshot the cached value into the payload before the
                // frame leaves
                if let Some(reg) = Reg::from_addr(token & !WRITE_BIT) {
                    let value = self.cached_value(reg);
                    self.out[1..5].copy_from_slice(&value.to_be_bytes());
                }
            } else {
                self.out[1..5].fill(0);
            }
            token
        } else {
            // Queue drained but a read is waiting: emit a pure collect
            // frame re-addressed to the same register
            self.reading_only = true;
            self.out[1..5].fill(0);
            self.pending_read.map(Reg::addr).unwrap_or(0)
        };

        self.out[0] = token;
        Some(Transfer {
            tx: self.out,
            // Only a read *request* keeps the transaction open; writes
            // and collect frames let the bus move on
            ends_transaction: self.reading_only || token & WRITE_BIT != 0,
        })
    }

    /// Feed the 5 response bytes of the completed transfer back in.
    /// Returns the next frame to send, if any.
    pub fn transfer_complete(&mut self, rx: [u8; 5]) -> Option<Transfer> {
        self.response = rx;
        self.status = rx[0];

        // The payload belongs to the register requested one frame ago
        if let Some(reg) = self.pending_read.take() {
            let value = u32::from_be_bytes([rx[1], rx[2], rx[3], rx[4]]);
            self.store_value(reg, value);
        }

        // If the frame that just completed was itself a read request,
        // remember it so the next frame clocks its value in
        if !self.reading_only && self.out[0] & WRITE_BIT == 0 {
            self.pending_read = Reg::from_addr(self.out[0]);
        }
        self.reading_only = false;
        self.transmitting = false;

        self.pump()
    }

    /// Periodic maintenance; call with the elapsed time since the last
    /// call. Every [`CHECK_PERIOD_MS`] the pin states, microstep
    /// counter and driver status are re-read. Refresh reads are dropped
    /// if the queue is full; the next period retries.
    pub fn check(&mut self, elapsed_ms: u32) -> Option<Transfer> {
        self.check_clock_ms = self.check_clock_ms.saturating_add(elapsed_ms);
        if self.check_clock_ms < CHECK_PERIOD_MS {
            return None;
        }
        self.check_clock_ms = 0;

        let mut started = self.read_register(Reg::Ioin).ok().flatten();
        started = started.or(self.read_register(Reg::MsCnt).ok().flatten());
        started.or(self.read_register(Reg::DrvStatus).ok().flatten())
    }

    /// Configure the chip. Queues the full power-on register sequence
    /// and arms the periodic check; returns the first frame to send.
    pub fn init(&mut self) -> Result<Option<Transfer>, QueueFull> {
        self.ihold_irun.ihold = 7;
        self.ihold_irun.irun = 30;
        self.ihold_irun.iholddelay = 7;
        let mut started = self.write_register(Reg::IholdIrun)?;

        self.tpowerdown = 256;
        started = started.or(self.write_register(Reg::TPowerDown)?);

        self.xdirect = 0;
        started = started.or(self.write_register(Reg::XDirect)?);

        self.vdcmin = 0;
        started = started.or(self.write_register(Reg::VdcMin)?);

        self.gconf.en_pwm_mode = true;
        started = started.or(self.write_register(Reg::GConf)?);

        self.chopconf = ChopConf::from_bits(CHOPCONF_BASELINE);
        self.chopconf.toff = 0x5;
        self.chopconf.hstrt = 0x4;
        self.chopconf.hend = 0x1;
        self.chopconf.tfd3 = false;
        self.chopconf.disfdcc = false;
        self.chopconf.rndtf = false;
        self.chopconf.chm = false;
        self.chopconf.tbl = 0x2;
        self.chopconf.vsense = true;
        self.chopconf.vhighfs = false;
        self.chopconf.vhighchm = false;
        self.chopconf.sync = 0x0;
        self.chopconf.mres = 0x3;
        self.chopconf.intpol = false;
        self.chopconf.dedge = false;
        self.chopconf.diss2g = false;
        started = started.or(self.write_register(Reg::ChopConf)?);

        self.pwmconf.pwm_ampl = 200;
        self.pwmconf.pwm_grad = 1;
        self.pwmconf.pwm_freq = 0;
        self.pwmconf.pwm_autoscale = true;
        self.pwmconf.pwm_symmetric = false;
        self.pwmconf.freewheel = 0;
        started = started.or(self.write_register(Reg::PwmConf)?);

        started = started.or(self.read_register(Reg::Ioin)?);
        started = started.or(self.read_register(Reg::MsCnt)?);

        self.check_clock_ms = 0;
        Ok(started)
    }

    /// Cache value marshalled into a write frame
    fn cached_value(&self, reg: Reg) -> u32 {
        match reg {
            Reg::GConf => self.gconf.to_bits(),
            Reg::GStat => self.gstat.to_bits(),
            Reg::Ioin => self.ioin.to_bits(),
            Reg::IholdIrun => self.ihold_irun.to_bits(),
            Reg::TPowerDown => self.tpowerdown,
            Reg::TStep => self.tstep,
            Reg::TPwmThrs => self.tpwmthrs,
            Reg::TCoolThrs => self.tcoolthrs,
            Reg::THigh => self.thigh,
            Reg::XDirect => self.xdirect,
            Reg::VdcMin => self.vdcmin,
            Reg::MsCnt => self.mscnt,
            Reg::ChopConf => self.chopconf.to_bits(),
            Reg::CoolConf => self.coolconf,
            Reg::DrvStatus => self.drv_status.to_bits(),
            Reg::PwmConf => self.pwmconf.to_bits(),
        }
    }

    /// Demarshal a collected read into its cache. Registers the chip
    /// never returns are left alone.
    fn store_value(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::GConf => self.gconf = GConf::from_bits(value),
            Reg::GStat => self.gstat = GStat::from_bits(value),
            Reg::Ioin => self.ioin = Ioin::from_bits(value),
            Reg::TStep => self.tstep = value,
            Reg::XDirect => self.xdirect = value,
            Reg::MsCnt => self.mscnt = value,
            Reg::ChopConf => self.chopconf = ChopConf::from_bits(value),
            Reg::CoolConf => self.coolconf = value,
            Reg::DrvStatus => self.drv_status = DrvStatus::from_bits(value),
            _ => {}
        }
    }
}
