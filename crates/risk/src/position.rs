use common::{OrderSide, PositionState, Signal};

/// Whether `signal` should lead to an order given the current position.
///
/// This is the only guard against resubmitting the same side on
/// consecutive cycles: buys are ignored while long, sells while flat.
pub fn should_act(signal: Signal, position: PositionState) -> bool {
    match signal {
        Signal::Buy => position != PositionState::Long,
        Signal::Sell => position != PositionState::Flat,
        Signal::Hold => false,
    }
}

/// Position after a confirmed fill on `side`.
pub fn apply_fill(side: OrderSide) -> PositionState {
    match side {
        OrderSide::Buy => PositionState::Long,
        OrderSide::Sell => PositionState::Flat,
    }
}
