// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SNES controller to USB game pad, on RP2040.
//!
//! `main` brings the chip up, hands the USB controller to the protocol
//! library, and then spends the rest of its life polling the controller's
//! shift register and posting a report whenever the buttons change. All USB
//! work happens in the USBCTRL interrupt; the UART interrupt drains the trace.
//!
//! Wiring, from the controller plug: +5V and ground to the board, LATCH and
//! CLOCK to the pins below, DATA to its pin (pulled up here, since the pad
//! only ever pulls it down).

#![no_std]
#![no_main]

mod board;

use cortex_m::peripheral::NVIC;
use cortex_m_rt::entry;
use rp2040_pac::{interrupt, Interrupt};

use defmt_rtt as _;
use panic_halt as _;

use snes_usb::config::{SNES_BITS, SNES_HALF_CLOCK_US, SNES_LATCH_US};
use snes_usb::{GamepadReport, SharedDevice, SnesButtons, UsbDevice};

use board::{Rp2040Sie, UartTrace};

cfg_if::cfg_if! {
    if #[cfg(feature = "target-pico")] {
        const LED_PIN: u8 = 25;
        const LATCH_PIN: u8 = 2;
        const CLOCK_PIN: u8 = 3;
        const DATA_PIN: u8 = 4;
        const TRACE_TX_PIN: u8 = 0;
    } else if #[cfg(feature = "target-feather")] {
        const LED_PIN: u8 = 13;
        const LATCH_PIN: u8 = 6;
        const CLOCK_PIN: u8 = 7;
        const DATA_PIN: u8 = 8;
        const TRACE_TX_PIN: u8 = 0;
    } else {
        compile_error!("missing or unknown target-* feature");
    }
}

// Second stage bootloader, matched to each board's flash chip.
cfg_if::cfg_if! {
    if #[cfg(feature = "target-feather")] {
        #[link_section = ".boot2"]
        #[used]
        pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GD25Q64CS;
    } else {
        #[link_section = ".boot2"]
        #[used]
        pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
    }
}

/// What `clk_sys` ends up at, for busy-wait delays.
const SYS_CLOCK_MHZ: u32 = 132;

static USB: SharedDevice<Rp2040Sie, UartTrace> = SharedDevice::new();

#[entry]
fn main() -> ! {
    let p = rp2040_pac::Peripherals::take().unwrap();

    //////////////////////////////////////////////////////////////////////////
    // Pins.

    p.RESETS
        .reset
        .modify(|_, w| w.io_bank0().clear_bit().pads_bank0().clear_bit());
    while !p.RESETS.reset_done.read().io_bank0().bit()
        || !p.RESETS.reset_done.read().pads_bank0().bit()
    {}

    for pin in [LED_PIN, LATCH_PIN, CLOCK_PIN, DATA_PIN] {
        p.IO_BANK0.gpio[pin as usize]
            .gpio_ctrl
            .write(|w| w.funcsel().sio());
    }
    // UART0 TX.
    p.IO_BANK0.gpio[TRACE_TX_PIN as usize]
        .gpio_ctrl
        .write(|w| unsafe { w.funcsel().bits(2) });
    p.PADS_BANK0.gpio[DATA_PIN as usize].write(|w| {
        w.ie().set_bit().pue().set_bit().pde().clear_bit().schmitt().set_bit()
    });

    // Shift clock idles high, latch idles low, LED off.
    raise_pin(&p.SIO, CLOCK_PIN);
    lower_pin(&p.SIO, LATCH_PIN);
    raise_pin(&p.SIO, LED_PIN);
    p.SIO
        .gpio_oe_set
        .write(|w| unsafe { w.bits(1 << LED_PIN | 1 << LATCH_PIN | 1 << CLOCK_PIN) });

    //////////////////////////////////////////////////////////////////////////
    // Clocks: crystal, then 132 MHz for the core and peripherals and 48 MHz
    // for USB.

    p.XOSC.ctrl.write(|w| unsafe { w.bits(0xfab_aa0) });
    while !p.XOSC.status.read().stable().bit() {}
    p.CLOCKS.clk_ref_ctrl.write(|w| w.src().xosc_clksrc());
    while p.CLOCKS.clk_ref_selected.read().bits() != (1 << 2) {}
    p.ROSC.ctrl.write(|w| unsafe { w.bits(0xd1e_fa4) });

    // PLL_SYS: 12 MHz * 132 = 1584 MHz VCO, / (6 * 2) = 132 MHz.
    p.RESETS.reset.modify(|_, w| w.pll_sys().clear_bit());
    while !p.RESETS.reset_done.read().pll_sys().bit() {}
    p.PLL_SYS.cs.write(|w| unsafe { w.refdiv().bits(1) });
    p.PLL_SYS.fbdiv_int.write(|w| unsafe { w.fbdiv_int().bits(132) });
    p.PLL_SYS.pwr.write(|w| w.pd().clear_bit().vcopd().clear_bit());
    while !p.PLL_SYS.cs.read().lock().bit() {}
    p.PLL_SYS
        .prim
        .write(|w| unsafe { w.postdiv1().bits(6).postdiv2().bits(2) });
    p.PLL_SYS.pwr.modify(|_, w| w.postdivpd().clear_bit());

    p.CLOCKS.clk_sys_ctrl.write(|w| w.auxsrc().clksrc_pll_sys());
    p.CLOCKS
        .clk_sys_ctrl
        .modify(|_, w| w.src().clksrc_clk_sys_aux());
    while p.CLOCKS.clk_sys_selected.read().bits() != (1 << 1) {}

    // The trace UART runs off clk_peri.
    p.CLOCKS
        .clk_peri_ctrl
        .write(|w| w.auxsrc().clk_sys().enable().set_bit());

    // PLL_USB: 12 MHz * 100 = 1200 MHz VCO, / (5 * 5) = 48 MHz.
    p.RESETS.reset.modify(|_, w| w.pll_usb().clear_bit());
    while !p.RESETS.reset_done.read().pll_usb().bit() {}
    p.PLL_USB.cs.write(|w| unsafe { w.refdiv().bits(1) });
    p.PLL_USB.fbdiv_int.write(|w| unsafe { w.fbdiv_int().bits(100) });
    p.PLL_USB.pwr.write(|w| w.pd().clear_bit().vcopd().clear_bit());
    while !p.PLL_USB.cs.read().lock().bit() {}
    p.PLL_USB
        .prim
        .write(|w| unsafe { w.postdiv1().bits(5).postdiv2().bits(5) });
    p.PLL_USB.pwr.modify(|_, w| w.postdivpd().clear_bit());

    p.CLOCKS
        .clk_usb_ctrl
        .write(|w| w.auxsrc().clksrc_pll_usb().enable().set_bit());

    //////////////////////////////////////////////////////////////////////////
    // Trace and USB.

    let trace = UartTrace::new(p.UART0, &p.RESETS);
    let sie = Rp2040Sie::new(p.USBCTRL_REGS, p.USBCTRL_DPRAM, &p.RESETS);
    let device = UsbDevice::new(sie, trace);
    USB.install(device);

    // Safety: both handlers only reach shared state through `USB`.
    unsafe {
        NVIC::unmask(Interrupt::UART0_IRQ);
        NVIC::unmask(Interrupt::USBCTRL_IRQ);
    }

    USB.with(|d| d.hw().connect());
    defmt::info!("connected");

    //////////////////////////////////////////////////////////////////////////
    // Controller polling.

    let mut last = SnesButtons::empty();
    loop {
        let buttons = poll_pad(&p.SIO);

        // The LED is wired to light while any button is held.
        if buttons.is_empty() {
            raise_pin(&p.SIO, LED_PIN);
        } else {
            lower_pin(&p.SIO, LED_PIN);
        }

        if buttons != last {
            last = buttons;
            defmt::debug!("buttons {=u16:#x}", buttons.bits());
            USB.report_changed(GamepadReport::from_buttons(buttons));
        }
    }
}

/// Latches the controller and clocks out its 16 bits.
fn poll_pad(sio: &rp2040_pac::SIO) -> SnesButtons {
    raise_pin(sio, LATCH_PIN);
    delay_us(SNES_LATCH_US);
    lower_pin(sio, LATCH_PIN);
    delay_us(SNES_HALF_CLOCK_US);

    let mut levels = [true; SNES_BITS];
    for level in &mut levels {
        lower_pin(sio, CLOCK_PIN);
        *level = sio.gpio_in.read().bits() & (1 << DATA_PIN) != 0;
        delay_us(SNES_HALF_CLOCK_US);
        raise_pin(sio, CLOCK_PIN);
        delay_us(SNES_HALF_CLOCK_US);
    }
    SnesButtons::from_samples(levels)
}

fn delay_us(us: u32) {
    cortex_m::asm::delay(us * SYS_CLOCK_MHZ);
}

#[inline(always)]
fn raise_pin(sio: &rp2040_pac::SIO, pin: u8) {
    sio.gpio_out_set.write(|w| unsafe { w.bits(1 << pin) });
}

#[inline(always)]
fn lower_pin(sio: &rp2040_pac::SIO, pin: u8) {
    sio.gpio_out_clr.write(|w| unsafe { w.bits(1 << pin) });
}

#[interrupt]
fn USBCTRL_IRQ() {
    USB.on_interrupt();
}

#[interrupt]
fn UART0_IRQ() {
    USB.with(|d| d.trace_mut().on_interrupt());
}
