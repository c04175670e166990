//! Order Workflow
//!
//! This demo drives an order through a hierarchical lifecycle stored in
//! the in-memory store.
//!
//! Key concepts:
//! - Composite states with default substates (Open -> New, Closed -> Shipped)
//! - Events bubbling to the ancestor that handles them
//! - Actions that mutate the order between exit and entry
//! - Side effects that run only after a verified commit
//! - Final states that reject every event
//!
//! Run with: RUST_LOG=statehold=debug cargo run --example order_workflow

use serde::{Deserialize, Serialize};
use statehold::builder::{MachineBuilder, StateBuilder};
use statehold::effects::{Context, Machine, StateEvent, Target};
use statehold::entity::{Attributes, Entity, MemoryStore, Record};
use statehold::{state_kinds, DispatchError, DispatchOutcome, StateKind};
use tracing_subscriber::EnvFilter;

state_kinds! {
    enum OrderState {
        Root,
        Open,
        New,
        Paid,
        Closed,
        Shipped,
        Cancelled,
    }
}

enum Command {
    Pay { cents: u32 },
    Ship { address: String },
    Cancel,
    Note,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Order {
    state: Option<OrderState>,
    paid_cents: u32,
    ship_to: Option<String>,
    notes: u32,
}

impl Attributes for Order {
    type Kind = OrderState;

    fn state(&self) -> Result<OrderState, String> {
        self.state.ok_or_else(|| "order was never opened".to_string())
    }
}

type Rec = Record<Order>;
type Declare = StateBuilder<Rec, Command>;

// Leaf entry: persist the state the order is now in.
fn settle(cx: &mut Context<'_, Rec, Command>) -> Result<(), DispatchError> {
    let state = cx.state();
    let order = cx.entity_mut();
    order.attributes_mut().state = Some(state);
    order.save()?;
    Ok(())
}

fn machine() -> Result<Machine<Rec, Command>, statehold::ConfigError> {
    MachineBuilder::new()
        .state(
            Declare::root(OrderState::Root)
                .default_substate(OrderState::Open)
                .handle(|cx| {
                    Ok(match cx.payload() {
                        Command::Cancel => Some(Target::to(OrderState::Cancelled)),
                        _ => None,
                    })
                }),
        )
        .state(
            Declare::composite(OrderState::Open)
                .parent(OrderState::Root)
                .default_substate(OrderState::New)
                .handle_internal(|cx| {
                    if !matches!(cx.payload(), Command::Note) {
                        return Ok(false);
                    }
                    let order = cx.entity_mut();
                    order.attributes_mut().notes += 1;
                    order.save()?;
                    Ok(true)
                })
                .handle(|cx| {
                    Ok(match cx.payload() {
                        Command::Pay { cents } if *cents > 0 => Some(Target::to(OrderState::Paid)),
                        _ => None,
                    })
                }),
        )
        .state(Declare::simple(OrderState::New).parent(OrderState::Open).on_entry(settle))
        .state(
            Declare::simple(OrderState::Paid)
                .parent(OrderState::Open)
                .on_entry(settle)
                .handle(|cx| {
                    Ok(match cx.payload() {
                        Command::Ship { .. } => Some(Target::to(OrderState::Closed)),
                        _ => None,
                    })
                }),
        )
        .state(
            Declare::composite(OrderState::Closed)
                .parent(OrderState::Root)
                .default_substate(OrderState::Shipped),
        )
        .state(
            Declare::simple(OrderState::Shipped)
                .parent(OrderState::Closed)
                .on_entry(|cx| {
                    settle(cx)?;
                    let tracking = format!("TRACK-{}", &cx.entity().id().simple().to_string()[..8]);
                    let message = match cx.payload() {
                        Command::Ship { address } => {
                            format!("Order shipped to {address}. Tracking: {tracking}")
                        }
                        _ => format!("Order shipped. Tracking: {tracking}"),
                    };
                    cx.defer_side_effect(move || println!("  [Notification] {message}"));
                    Ok(())
                }),
        )
        .state(
            Declare::final_state(OrderState::Cancelled)
                .parent(OrderState::Closed)
                .on_entry(settle),
        )
        .build()
}

fn report(label: &str, outcome: &DispatchOutcome<OrderState, uuid::Uuid>) {
    match outcome {
        DispatchOutcome::Transitioned { state, record } => {
            let exited: Vec<&str> = record.exited.iter().map(|s| s.name()).collect();
            let entered: Vec<&str> = record.entered.iter().map(|s| s.name()).collect();
            println!("{label}: now {}", state.name());
            println!("  exited:  {exited:?}");
            println!("  entered: {entered:?}");
        }
        DispatchOutcome::Handled(state) => println!("{label}: handled in {}", state.name()),
        DispatchOutcome::NoHandler { dispatched_to } => {
            println!("{label}: ignored by {}", dispatched_to.name())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    println!("=== Hierarchical Order Workflow ===\n");

    let machine = machine()?;
    let store = MemoryStore::new();

    let mut order = store.create(Order {
        state: None,
        paid_cents: 0,
        ship_to: None,
        notes: 0,
    })?;
    let outcome = machine.initialize(&mut order, StateEvent::new(Command::Note))?;
    report("Created", &outcome);

    let outcome = machine.send(&mut order, StateEvent::new(Command::Note))?;
    report("Note", &outcome);

    let cents = 14_999;
    let pay = StateEvent::new(Command::Pay { cents }).with_action(move |order: &mut Rec| {
        println!("  [Payment] Charging ${:.2}", f64::from(cents) / 100.0);
        order.attributes_mut().paid_cents += cents;
        order.save()?;
        Ok(())
    });
    let outcome = machine.send(&mut order, pay)?;
    report("Pay", &outcome);

    let address = "123 Main St".to_string();
    let ship = StateEvent::new(Command::Ship {
        address: address.clone(),
    })
    .with_action(move |order: &mut Rec| {
        order.attributes_mut().ship_to = Some(address);
        order.save()?;
        Ok(())
    });
    let outcome = machine.send(&mut order, ship)?;
    report("Ship", &outcome);

    let outcome = machine.send(&mut order, StateEvent::new(Command::Note))?;
    report("Note after shipping", &outcome);

    println!("\nA second order is cancelled while still open:");
    let mut second = store.create(Order {
        state: None,
        paid_cents: 0,
        ship_to: None,
        notes: 0,
    })?;
    machine.initialize(&mut second, StateEvent::new(Command::Note))?;
    let outcome = machine.send(&mut second, StateEvent::new(Command::Cancel))?;
    report("Cancel", &outcome);
    let outcome = machine.send(&mut second, StateEvent::new(Command::Pay { cents: 100 }))?;
    report("Pay after cancelling", &outcome);

    let stored = store.load(order.id())?;
    println!(
        "\nFirst order: {} paid, shipped to {}, {} note(s)",
        stored.paid_cents,
        stored.ship_to.as_deref().unwrap_or("nowhere"),
        stored.notes
    );

    println!("\nKey Takeaways:");
    println!("- The order derives its state from its own attributes");
    println!("- Ancestors handle what their substates do not");
    println!("- Transitions to composites settle on their default leaf");
    println!("- Notifications are sent only after the transition commits");
    Ok(())
}
