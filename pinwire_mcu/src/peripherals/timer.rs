//! 8-bit timer/counter (timer0).
//!
//! The counter advances by the prescaled number of CPU cycles consumed since
//! the previous tick. Supported waveform modes are normal, CTC, fast PWM and
//! phase-correct PWM; the compare output pins are not driven. Overflow and
//! compare-match flags raise interrupts when enabled in TIMSK.

use super::{ChangeSet, Peripheral};
use crate::cpu::{CpuState, InterruptRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub tifr: u16,
    pub tccra: u16,
    pub tccrb: u16,
    pub tcnt: u16,
    pub ocra: u16,
    pub ocrb: u16,
    pub timsk: u16,
    pub compa_vector: u8,
    pub compb_vector: u8,
    pub ovf_vector: u8,
}

pub const TIMER0: TimerConfig = TimerConfig {
    tifr: 0x35,
    tccra: 0x44,
    tccrb: 0x45,
    tcnt: 0x46,
    ocra: 0x47,
    ocrb: 0x48,
    timsk: 0x6E,
    compa_vector: 14,
    compb_vector: 15,
    ovf_vector: 16,
};

const TOV: u8 = 0x01;
const OCFA: u8 = 0x02;
const OCFB: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
    Normal,
    Ctc,
    FastPwm { top_is_ocra: bool },
    PhaseCorrect { top_is_ocra: bool },
}

impl Waveform {
    fn from_wgm(wgm: u8) -> Option<Self> {
        match wgm {
            0 => Some(Waveform::Normal),
            1 => Some(Waveform::PhaseCorrect { top_is_ocra: false }),
            2 => Some(Waveform::Ctc),
            3 => Some(Waveform::FastPwm { top_is_ocra: false }),
            5 => Some(Waveform::PhaseCorrect { top_is_ocra: true }),
            7 => Some(Waveform::FastPwm { top_is_ocra: true }),
            _ => None,
        }
    }
}

/// Clock divider selected by CS bits; `None` when stopped or externally clocked.
fn divider(clock_select: u8) -> Option<u64> {
    match clock_select {
        1 => Some(1),
        2 => Some(8),
        3 => Some(64),
        4 => Some(256),
        5 => Some(1024),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer8 {
    config: TimerConfig,
    last_cycles: u64,
    prescaler: u64,
    counting_down: bool,
}

impl Timer8 {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            last_cycles: 0,
            prescaler: 0,
            counting_down: false,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    fn count(&mut self, tcnt: u8, waveform: Waveform, ocra: u8, ocrb: u8) -> (u8, u8) {
        let mut flags = 0;
        let next = match waveform {
            Waveform::PhaseCorrect { top_is_ocra } => {
                let top = if top_is_ocra { ocra } else { 0xFF };
                if top == 0 {
                    0
                } else if self.counting_down {
                    if tcnt <= 1 {
                        self.counting_down = false;
                        flags |= TOV;
                        0
                    } else {
                        tcnt - 1
                    }
                } else if tcnt >= top {
                    self.counting_down = true;
                    top - 1
                } else {
                    tcnt + 1
                }
            }
            _ => {
                let top = match waveform {
                    Waveform::Ctc | Waveform::FastPwm { top_is_ocra: true } => ocra,
                    _ => 0xFF,
                };
                if tcnt == top || tcnt == 0xFF {
                    // Passing MAX always overflows; CTC sets nothing at a lower TOP.
                    if waveform != Waveform::Ctc || tcnt == 0xFF {
                        flags |= TOV;
                    }
                    0
                } else {
                    tcnt.wrapping_add(1)
                }
            }
        };
        if next == ocra {
            flags |= OCFA;
        }
        if next == ocrb {
            flags |= OCFB;
        }
        (next, flags)
    }

    fn raise_interrupts(&self, cpu: &mut CpuState) {
        let pending = cpu.peek(self.config.tifr) & cpu.peek(self.config.timsk) & (TOV | OCFA | OCFB);
        let (vector, flag_mask) = if pending & OCFA != 0 {
            (self.config.compa_vector, OCFA)
        } else if pending & OCFB != 0 {
            (self.config.compb_vector, OCFB)
        } else if pending & TOV != 0 {
            (self.config.ovf_vector, TOV)
        } else {
            return;
        };
        cpu.request_interrupt(InterruptRequest {
            vector,
            flag_addr: self.config.tifr,
            flag_mask,
        });
    }
}

impl Peripheral for Timer8 {
    fn tick(&mut self, cpu: &mut CpuState) -> ChangeSet {
        let config = self.config;

        // Flags clear when a one is written to them.
        if let Some(write) = cpu.io_write {
            if write.addr == config.tifr {
                cpu.poke(config.tifr, write.previous & !write.strobe);
            }
        }

        let elapsed = cpu.cycles.saturating_sub(self.last_cycles);
        self.last_cycles = cpu.cycles;

        let tccrb = cpu.peek(config.tccrb);
        let wgm = (cpu.peek(config.tccra) & 0x03) | ((tccrb >> 1) & 0x04);
        match (divider(tccrb & 0x07), Waveform::from_wgm(wgm)) {
            (Some(divider), Some(waveform)) => {
                self.prescaler += elapsed;
                let ticks = self.prescaler / divider;
                self.prescaler %= divider;

                let ocra = cpu.peek(config.ocra);
                let ocrb = cpu.peek(config.ocrb);
                let mut tcnt = cpu.peek(config.tcnt);
                let mut flags = 0;
                for _ in 0..ticks {
                    let (next, raised) = self.count(tcnt, waveform, ocra, ocrb);
                    tcnt = next;
                    flags |= raised;
                }
                cpu.poke(config.tcnt, tcnt);
                if flags != 0 {
                    let tifr = cpu.peek(config.tifr);
                    cpu.poke(config.tifr, tifr | flags);
                }
            }
            _ => self.prescaler = 0,
        }

        self.raise_interrupts(cpu);
        ChangeSet::default()
    }
}
