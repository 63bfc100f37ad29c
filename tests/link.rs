//! Master and slave wired together through a simulated bus.
//!
//! Every time the master reads its clock, one millisecond passes and the slave's 1 ms task runs,
//! so the blocking master calls and the slave state machine interleave the way they do on the
//! boards. Each byte the master clocks runs both slave flow-control callbacks.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal_nb::spi::{self, FullDuplex};

use flowspi::message::{AppMessage, GameStatus, Starter};
use flowspi::{
    command, Dispatched, Dispatcher, FlowInput, FlowOutput, FrameBuf, LinkError, LinkFlags,
    Mailbox, MasterConfig, MasterLink, Polarity, SlaveConfig, SlaveLink, State,
};

#[derive(Clone)]
struct Wire(Rc<Cell<bool>>);

impl Wire {
    fn high() -> Self {
        Wire(Rc::new(Cell::new(true)))
    }
}

impl ErrorType for Wire {
    type Error = Infallible;
}

impl InputPin for Wire {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.get())
    }
}

impl OutputPin for Wire {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set(true);
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

type Clock = Box<dyn Fn() -> u32>;

struct Slave {
    link: SlaveLink<Wire, Wire, Wire, Clock>,
    dispatcher: Dispatcher<'static, ()>,
    log: Vec<Dispatched>,
}

impl Slave {
    // The application MCU's 1 ms task
    fn step(&mut self) {
        if let Some(frame) = self.link.run_active_state() {
            let outcome = self.dispatcher.dispatch(&frame, &mut self.link);
            self.log.push(outcome.unwrap());
        }
    }
}

struct Bus {
    slave: Rc<RefCell<Slave>>,
    staged: Option<u8>,
    clocked: Rc<Cell<usize>>,
}

impl spi::ErrorType for Bus {
    type Error = Infallible;
}

impl FullDuplex<u8> for Bus {
    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.staged.take().ok_or(nb::Error::WouldBlock)
    }

    fn write(&mut self, word: u8) -> nb::Result<(), Infallible> {
        let mut slave = self.slave.borrow_mut();
        let out = slave.link.tx_flow_control();
        slave.link.rx_flow_control(word);
        self.staged = Some(out);
        self.clocked.set(self.clocked.get() + 1);
        Ok(())
    }
}

type Master = MasterLink<Bus, Wire, Wire, Wire, Clock, NoDelay>;

struct Rig {
    master: Master,
    slave: Rc<RefCell<Slave>>,
    mailbox: &'static Mailbox,
    now: Rc<Cell<u32>>,
    clocked: Rc<Cell<usize>>,
}

impl Rig {
    fn new() -> Self {
        let cs = Wire::high();
        let srdy = Wire::high();
        let mrdy = Wire::high();
        let now = Rc::new(Cell::new(0u32));
        let mailbox: &'static Mailbox = Box::leak(Box::new(Mailbox::new()));

        let slave_clock: Clock = {
            let now = now.clone();
            Box::new(move || now.get())
        };
        let link = SlaveLink::initialize(
            FlowInput::new(cs.clone(), Polarity::ActiveLow),
            FlowOutput::new(srdy.clone(), Polarity::ActiveLow),
            FlowOutput::new(mrdy.clone(), Polarity::ActiveLow),
            slave_clock,
            SlaveConfig::default(),
        );
        let slave = Rc::new(RefCell::new(Slave {
            link,
            dispatcher: Dispatcher::new((), mailbox),
            log: Vec::new(),
        }));

        let master_clock: Clock = {
            let now = now.clone();
            let slave = slave.clone();
            Box::new(move || {
                now.set(now.get() + 1);
                slave.borrow_mut().step();
                now.get()
            })
        };
        let clocked = Rc::new(Cell::new(0));
        let bus = Bus {
            slave: slave.clone(),
            staged: None,
            clocked: clocked.clone(),
        };
        let master = MasterLink::new(
            bus,
            FlowOutput::new(cs, Polarity::ActiveLow),
            FlowInput::new(srdy, Polarity::ActiveLow),
            FlowInput::new(mrdy, Polarity::ActiveLow),
            master_clock,
            NoDelay,
            MasterConfig::default(),
        )
        .unwrap();

        Rig {
            master,
            slave,
            mailbox,
            now,
            clocked,
        }
    }

    // Let time pass without the master doing anything
    fn tick(&self, ms: u32) {
        for _ in 0..ms {
            self.now.set(self.now.get() + 1);
            self.slave.borrow_mut().step();
        }
    }

    fn queue_on_slave(&self, msg: FrameBuf) {
        self.slave.borrow_mut().link.queue_message(msg).unwrap();
    }

    fn slave_state(&self) -> State {
        self.slave.borrow().link.state()
    }

    fn slave_flags(&self) -> LinkFlags {
        self.slave.borrow().link.flags()
    }
}

#[test]
fn self_test_round_trip() {
    let mut rig = Rig::new();
    let mut buf = [0u8; 16];
    assert_eq!(rig.master.self_test(&mut buf), Ok(true));
    assert_eq!(&buf[..3], &[0x5A, 1, command::TEST_RESPONSE]);

    rig.tick(2);
    assert_eq!(rig.slave.borrow().log, [Dispatched::Replied]);
    assert_eq!(rig.slave_state(), State::Idle);
    assert!(!rig.slave.borrow().link.has_pending());
    assert_eq!(rig.slave_flags(), LinkFlags::empty());
}

#[test]
fn application_message_from_master_lands_in_mailbox() {
    let mut rig = Rig::new();
    let mv = AppMessage::GameMove {
        position: 4,
        status: GameStatus::Playing,
    };
    rig.master.send(mv.encode().unwrap().as_bytes()).unwrap();
    // send returns once the slave has closed the session, so the frame is already dispatched
    assert_eq!(rig.mailbox.check(), Some(0xAA));

    let mut buf = [0u8; 8];
    assert_eq!(rig.mailbox.get(&mut buf), Some(3));
    assert_eq!(&buf[..3], &[0xAA, 4, 1]);
    assert_eq!(rig.mailbox.check(), None);
}

#[test]
fn application_message_from_slave_is_polled_by_master() {
    let mut rig = Rig::new();
    let mut buf = [0u8; 16];
    assert_eq!(rig.master.poll_incoming(&mut buf), Ok(None));

    rig.queue_on_slave(AppMessage::GameRequest(Starter::Local).encode().unwrap());
    rig.tick(1);

    let frame = rig.master.poll_incoming(&mut buf).unwrap().unwrap();
    assert_eq!(
        AppMessage::parse(frame),
        Ok(AppMessage::GameRequest(Starter::Local))
    );

    rig.tick(1);
    assert_eq!(rig.slave_state(), State::Idle);
    assert!(!rig.slave.borrow().link.has_pending());
    assert_eq!(rig.master.poll_incoming(&mut buf), Ok(None));
}

#[test]
fn busy_collision_clocks_nothing_then_resolves() {
    let mut rig = Rig::new();
    rig.queue_on_slave(AppMessage::Ack.encode().unwrap());
    rig.tick(1);

    let nack = AppMessage::Nack.encode().unwrap();
    assert_eq!(rig.master.send(nack.as_bytes()), Err(LinkError::Busy));
    assert_eq!(rig.clocked.get(), 0);

    // Chip-select is still asserted: read the slave's message, then retry
    let mut buf = [0u8; 16];
    assert_eq!(rig.master.receive(&mut buf), Ok(3));
    assert_eq!(&buf[..3], &[0x5A, 1, 0xAE]);
    rig.tick(1);

    rig.master.send(nack.as_bytes()).unwrap();
    rig.tick(1);
    assert_eq!(rig.mailbox.check(), Some(0xAF));
}

#[test]
fn back_to_back_sends_are_separate_sessions() {
    let mut rig = Rig::new();
    let ack = AppMessage::Ack.encode().unwrap();
    let nack = AppMessage::Nack.encode().unwrap();
    rig.master.send(ack.as_bytes()).unwrap();
    rig.master.send(nack.as_bytes()).unwrap();

    assert_eq!(
        rig.slave.borrow().log,
        [Dispatched::Posted(0xAE), Dispatched::Posted(0xAF)]
    );
    assert_eq!(rig.mailbox.check(), Some(0xAF));
    assert_eq!(rig.mailbox.overwritten(), 1);
    assert_eq!(rig.slave_flags(), LinkFlags::empty());
    assert_eq!(rig.slave_state(), State::Idle);
}

#[test]
fn send_right_after_receive_starts_a_new_session() {
    let mut rig = Rig::new();
    rig.queue_on_slave(AppMessage::GameRequest(Starter::Remote).encode().unwrap());
    rig.tick(1);

    let mut buf = [0u8; 16];
    let frame = rig.master.poll_incoming(&mut buf).unwrap().unwrap();
    assert_eq!(frame.command(), 0xA2);

    let sync = AppMessage::SyncCheck.encode().unwrap();
    rig.master.send(sync.as_bytes()).unwrap();
    assert_eq!(rig.slave.borrow().log, [Dispatched::Posted(0xA0)]);
    assert_eq!(rig.mailbox.check(), Some(0xA0));
    assert!(!rig.slave.borrow().link.has_pending());
    assert_eq!(rig.slave_flags(), LinkFlags::empty());
}

#[test]
fn releasing_a_busy_session_drops_the_slave_message_visibly() {
    let mut rig = Rig::new();
    rig.queue_on_slave(AppMessage::Ack.encode().unwrap());
    rig.tick(1);

    let nack = AppMessage::Nack.encode().unwrap();
    assert_eq!(rig.master.send(nack.as_bytes()), Err(LinkError::Busy));
    rig.master.release().unwrap();
    rig.tick(2);

    assert_eq!(rig.clocked.get(), 0);
    assert_eq!(rig.slave_state(), State::Idle);
    assert!(!rig.slave.borrow().link.has_pending());
    assert!(rig.slave_flags().contains(LinkFlags::TX_INCOMPLETE));
    assert_eq!(rig.master.message_waiting(), Ok(false));
}

#[test]
fn stuck_chip_select_times_out_on_the_slave() {
    let mut rig = Rig::new();
    rig.queue_on_slave(AppMessage::Reset.encode().unwrap());
    rig.tick(1);

    let msg = AppMessage::SyncCheck.encode().unwrap();
    assert_eq!(rig.master.send(msg.as_bytes()), Err(LinkError::Busy));
    assert_eq!(rig.slave_state(), State::Tx);

    // Master never finishes the session
    rig.tick(1000);
    assert_eq!(rig.slave_state(), State::Idle);
    assert!(rig.slave_flags().contains(LinkFlags::TX_TIMEOUT));
    assert!(!rig.slave.borrow().link.has_pending());

    rig.master.release().unwrap();
    rig.tick(1);
    rig.master.send(msg.as_bytes()).unwrap();
    rig.tick(1);
    assert_eq!(rig.mailbox.check(), Some(0xA0));
}

#[test]
fn master_times_out_while_slave_waits_for_release() {
    let mut rig = Rig::new();
    // An abandoned session leaves chip-select asserted past the slave timeout
    rig.queue_on_slave(AppMessage::Reset.encode().unwrap());
    rig.tick(1);
    rig.master.send(&[0x5A, 1, 0xA0]).unwrap_err();
    rig.tick(1000);
    assert!(rig.slave_flags().contains(LinkFlags::CS_RELEASE_PENDING));

    let start = rig.now.get();
    assert_eq!(
        rig.master.send(&[0x5A, 1, 0xA0]),
        Err(LinkError::Timeout)
    );
    assert!(rig.now.get() - start >= 100);
    assert_eq!(rig.clocked.get(), 0);
}
