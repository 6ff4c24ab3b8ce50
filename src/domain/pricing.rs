//! Pure pricing arithmetic for carts and orders.
//!
//! Everything here is stateless; handlers feed these functions the rows
//! they loaded and persist the results themselves.

use rust_decimal::Decimal;

/// Line total for one cart or order item.
pub fn line_total(price_per_unit: Decimal, quantity: i32) -> Decimal {
    price_per_unit * Decimal::from(quantity)
}

/// Sum of item totals; zero for an empty cart.
pub fn cart_total<I>(item_totals: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    item_totals.into_iter().fold(Decimal::ZERO, |acc, t| acc + t)
}

/// Percentage discount on a subtotal, rounded to cents.
pub fn discount(subtotal: Decimal, percentage: Decimal) -> Decimal {
    (subtotal * percentage / Decimal::from(100)).round_dp(2)
}

/// Discount plus the resulting total, clamped so the total never goes
/// negative.
pub fn apply_discount(subtotal: Decimal, percentage: Decimal) -> (Decimal, Decimal) {
    let discount = discount(subtotal, percentage);
    let new_total = (subtotal - discount).max(Decimal::ZERO);
    (discount, new_total)
}

/// The money fields of an order, derived in one place at checkout time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutTotals {
    pub subtotal_before_promo: Decimal,
    pub discount: Decimal,
    pub subtotal_after_promo: Decimal,
    pub total_price: Decimal,
}

impl CheckoutTotals {
    /// Recomputes every total from the item rows. The cart's cached
    /// `total_price` is deliberately not an input.
    pub fn compute<I>(
        item_totals: I,
        promo_percentage: Option<Decimal>,
        shipping_amount: Decimal,
        tax_amount: Decimal,
    ) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let subtotal_before_promo = cart_total(item_totals);
        let (discount, subtotal_after_promo) = match promo_percentage {
            Some(percentage) => apply_discount(subtotal_before_promo, percentage),
            None => (Decimal::ZERO, subtotal_before_promo),
        };
        let total_price = subtotal_after_promo + shipping_amount + tax_amount;
        Self {
            subtotal_before_promo,
            discount,
            subtotal_after_promo,
            total_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_totals_scale_with_quantity() {
        assert_eq!(line_total(Decimal::new(10, 0), 2), Decimal::new(20, 0));
        assert_eq!(line_total(Decimal::new(10, 0), 3), Decimal::new(30, 0));
    }

    #[test]
    fn cart_total_sums_items_and_is_zero_when_empty() {
        let total = cart_total([Decimal::new(20, 0), Decimal::new(1050, 2)]);
        assert_eq!(total, Decimal::new(3050, 2));
        assert_eq!(cart_total(Vec::<Decimal>::new()), Decimal::ZERO);
    }

    #[test]
    fn ten_percent_off_one_hundred() {
        let (discount, new_total) =
            apply_discount(Decimal::new(100, 0), Decimal::new(10, 0));
        assert_eq!(discount, Decimal::new(10, 0));
        assert_eq!(new_total, Decimal::new(90, 0));
    }

    #[test]
    fn discount_is_rounded_to_cents() {
        // 15% of 19.99 is 2.9985
        let d = discount(Decimal::new(1999, 2), Decimal::new(15, 0));
        assert_eq!(d, Decimal::new(300, 2));
    }

    #[test]
    fn total_never_goes_negative() {
        let (discount, new_total) =
            apply_discount(Decimal::new(10, 0), Decimal::new(200, 0));
        assert_eq!(discount, Decimal::new(20, 0));
        assert_eq!(new_total, Decimal::ZERO);
    }

    #[test]
    fn checkout_totals_with_promo_shipping_and_tax() {
        let totals = CheckoutTotals::compute(
            [Decimal::new(60, 0), Decimal::new(40, 0)],
            Some(Decimal::new(10, 0)),
            Decimal::new(5, 0),
            Decimal::new(2, 0),
        );
        assert_eq!(totals.subtotal_before_promo, Decimal::new(100, 0));
        assert_eq!(totals.discount, Decimal::new(10, 0));
        assert_eq!(totals.subtotal_after_promo, Decimal::new(90, 0));
        assert_eq!(totals.total_price, Decimal::new(97, 0));
    }

    #[test]
    fn checkout_totals_without_promo() {
        let totals = CheckoutTotals::compute(
            [Decimal::new(30, 0)],
            None,
            Decimal::new(5, 0),
            Decimal::ZERO,
        );
        assert_eq!(totals.subtotal_before_promo, Decimal::new(30, 0));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.subtotal_after_promo, Decimal::new(30, 0));
        assert_eq!(totals.total_price, Decimal::new(35, 0));
    }
}
