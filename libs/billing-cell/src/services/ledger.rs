// libs/billing-cell/src/services/ledger.rs
//
// Line-item and invoice totals. Pure functions over exact decimals.
//

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BillingError, InvoiceItemInput};

/// Largest amount a `numeric(14,2)` money column holds.
// 999_999_999_999.99 (99_999_999_999_999 at scale 2); `Decimal::new` is not const.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 2);

/// Validated line ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub service_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub line_discount_total: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// `quantity * unit_price - discount`, rejecting inputs that would make the
/// line negative or meaningless.
pub fn compute_line(input: &InvoiceItemInput) -> Result<LineItem, BillingError> {
    let description = input.description.trim();
    if description.is_empty() {
        return Err(BillingError::ValidationError("Item description must not be blank".to_string()));
    }
    if input.quantity < 1 {
        return Err(BillingError::ValidationError(format!(
            "Item '{}' quantity must be at least 1",
            description
        )));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(BillingError::ValidationError(format!(
            "Item '{}' unit price must not be negative",
            description
        )));
    }
    if input.discount < Decimal::ZERO {
        return Err(BillingError::ValidationError(format!(
            "Item '{}' discount must not be negative",
            description
        )));
    }

    let gross = Decimal::from(input.quantity)
        .checked_mul(input.unit_price)
        .ok_or_else(|| BillingError::ValidationError(format!("Item '{}' amount overflows", description)))?;

    if gross > MAX_AMOUNT {
        return Err(BillingError::ValidationError(format!(
            "Item '{}' amount {} exceeds the maximum of {}",
            description, gross, MAX_AMOUNT
        )));
    }
    if input.discount > gross {
        return Err(BillingError::ValidationError(format!(
            "Item '{}' discount {} exceeds line amount {}",
            description, input.discount, gross
        )));
    }

    Ok(LineItem {
        description: description.to_string(),
        service_id: input.service_id,
        quantity: input.quantity,
        unit_price: input.unit_price,
        discount: input.discount,
        total: gross - input.discount,
    })
}

/// Computes every line and the invoice totals. `subtotal` is the sum of the
/// discounted line totals; `invoice_discount` comes off the subtotal.
pub fn compute_invoice(
    items: &[InvoiceItemInput],
    invoice_discount: Option<Decimal>,
) -> Result<(Vec<LineItem>, InvoiceTotals), BillingError> {
    if items.is_empty() {
        return Err(BillingError::ValidationError("An invoice needs at least one item".to_string()));
    }

    let lines = items.iter().map(compute_line).collect::<Result<Vec<_>, _>>()?;

    let subtotal = sum_amounts(lines.iter().map(|line| line.total), "Invoice subtotal")?;
    let line_discount_total = sum_amounts(lines.iter().map(|line| line.discount), "Line discount total")?;
    let discount = invoice_discount.unwrap_or(Decimal::ZERO);

    if discount < Decimal::ZERO {
        return Err(BillingError::ValidationError("Invoice discount must not be negative".to_string()));
    }
    if discount > subtotal {
        return Err(BillingError::ValidationError(format!(
            "Invoice discount {} exceeds subtotal {}",
            discount, subtotal
        )));
    }

    let tax = Decimal::ZERO;
    let total = subtotal - discount + tax;

    Ok((
        lines,
        InvoiceTotals {
            subtotal,
            discount,
            line_discount_total,
            tax,
            total,
        },
    ))
}

/// Adds money amounts without panicking, rejecting any sum beyond `MAX_AMOUNT`.
pub fn sum_amounts(amounts: impl IntoIterator<Item = Decimal>, label: &str) -> Result<Decimal, BillingError> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, amount| sum.checked_add(amount))
        .filter(|sum| *sum <= MAX_AMOUNT)
        .ok_or_else(|| BillingError::ValidationError(format!("{} exceeds the maximum of {}", label, MAX_AMOUNT)))
}
