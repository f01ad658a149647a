//! English rendering of reasons and optimizer labels.

use crate::domain::ledger::Reason;
use crate::domain::node::{weekday_keyword, Action, Band, Condition, Cross, Modifier, Trigger};
use crate::ports::label_port::LabelPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishLabels;

fn side(direction: Cross) -> &'static str {
    match direction {
        Cross::Above => "above",
        Cross::Below => "below",
    }
}

impl LabelPort for EnglishLabels {
    fn describe(&self, reason: &Reason) -> String {
        match *reason {
            Reason::Trigger {
                trigger,
                close,
                change_percent,
            } => match trigger {
                Trigger::PriceAbove { price } => {
                    format!("Price {:.2} is above {:.2}", close, price)
                }
                Trigger::PriceBelow { price } => {
                    format!("Price {:.2} is below {:.2}", close, price)
                }
                Trigger::PriceDrops { percent } => format!(
                    "Price dropped {:.2}% (threshold {}%)",
                    -change_percent, percent
                ),
                Trigger::PriceRises { percent } => format!(
                    "Price rose {:.2}% (threshold {}%)",
                    change_percent, percent
                ),
                Trigger::Weekday { day } => format!("Scheduled on {}", weekday_keyword(day)),
                Trigger::MonthDay { day } => format!("Monthly schedule (day {})", day),
                Trigger::EveryNDays { days } => format!("Every {} trading days", days),
                Trigger::FirstDay => "First trading day".to_string(),
            },
            Reason::Condition { condition, value } => match condition {
                Condition::RsiBelow { threshold } => {
                    format!("RSI {:.1} is below {}", value, threshold)
                }
                Condition::RsiAbove { threshold } => {
                    format!("RSI {:.1} is above {}", value, threshold)
                }
                Condition::MovingAverage { average, direction } => format!(
                    "Price crossed {} {} {} ({:.2})",
                    side(direction),
                    average.kind.to_string().to_uppercase(),
                    average.period,
                    value
                ),
                Condition::VolumeSpike { multiplier } => format!(
                    "Volume is {:.2}x the 20-day average (threshold {}x)",
                    value, multiplier
                ),
                Condition::Bollinger { band } => match band {
                    Band::Lower => format!("Price touched the lower Bollinger band ({:.2})", value),
                    Band::Upper => format!("Price touched the upper Bollinger band ({:.2})", value),
                },
                Condition::MacdCross { direction } => {
                    format!("MACD crossed {} its signal line ({:.3})", side(direction), value)
                }
                Condition::VolatilityAbove { percent } => {
                    format!("Volatility {:.2}% is above {}%", value, percent)
                }
            },
            Reason::Action { action } => match action {
                Action::Buy { amount } => format!("Buy {:.2}", amount),
                Action::Sell { units } => format!("Sell {} units", units),
                Action::BuyPercent { percent } => format!("Buy with {}% of cash", percent),
                Action::SellPercent { percent } => format!("Sell {}% of position", percent),
            },
            Reason::Modifier {
                modifier,
                entry_price,
                peak_price,
                close,
            } => match modifier {
                Modifier::StopLoss { percent } => format!(
                    "Stop loss: {:.2} fell {}% below entry {:.2}",
                    close, percent, entry_price
                ),
                Modifier::TakeProfit { percent } => format!(
                    "Take profit: {:.2} rose {}% above entry {:.2}",
                    close, percent, entry_price
                ),
                Modifier::TrailingStop { percent } => format!(
                    "Trailing stop: {:.2} fell {}% below peak {:.2}",
                    close, percent, peak_price
                ),
            },
            Reason::InsufficientCash {
                requested,
                available,
            } => format!(
                "Insufficient cash: requested {:.2}, available {:.2}",
                requested, available
            ),
            Reason::NoPosition { requested } => {
                format!("No position to sell ({} units requested)", requested)
            }
            Reason::BuyAndHold => "Buy and hold".to_string(),
            Reason::EvenSplit { assets } => {
                format!("Buy and hold, cash split evenly across {} assets", assets)
            }
        }
    }

    fn buy_and_hold(&self) -> String {
        "Buy & Hold".to_string()
    }
}
