use osr_browser_engine::core::{Point, Rect, ScaleFactor, Size};
use osr_browser_engine::rendering::ScalingManager;
use proptest::prelude::*;

proptest! {
    #[test]
    fn scale_then_unscale_stays_within_one_pixel(
        value in -100_000i32..100_000,
        scale in 0.5f32..=4.0,
    ) {
        let manager = ScalingManager::new(scale);
        let back = manager.unscale_value_of(manager.scale_value_of(value));
        prop_assert!((back - value).abs() <= 1, "{} -> {} at {}", value, back, scale);
    }

    #[test]
    fn intersection_is_contained_in_both(
        ax in -50i32..50, ay in -50i32..50, aw in 0i32..100, ah in 0i32..100,
        bx in -50i32..50, by in -50i32..50, bw in 0i32..100, bh in 0i32..100,
    ) {
        let a = Rect::new(ax, ay, aw, ah);
        let b = Rect::new(bx, by, bw, bh);
        let i = a.intersection(&b);
        if !i.is_empty() {
            prop_assert!(a.contains(&i));
            prop_assert!(b.contains(&i));
        }
    }
}

#[test]
fn test_unscale_by_zero_is_zero() {
    assert_eq!(ScaleFactor(0.0).unscale(640), 0);
    assert_eq!(ScalingManager::new(0.0).unscale_value_of(640), 0);
}

#[test]
fn test_hidpi_conversions() {
    let manager = ScalingManager::new(2.0);
    assert!(manager.is_scaling_enabled());
    assert_eq!(
        manager.logical_to_physical_size(Size::new(1200, 800)),
        Size::new(2400, 1600)
    );
    assert_eq!(
        manager.physical_to_logical_point(Point::new(101, 51)),
        Point::new(51, 26)
    );
    assert_eq!(
        manager.logical_to_physical_rect(Rect::new(10, 20, 30, 40)),
        Rect::new(20, 40, 60, 80)
    );

    manager.set_scale_factor(1.0);
    assert!(!manager.is_scaling_enabled());
}

#[test]
fn test_fractional_scale_rounds_half_away_from_zero() {
    let scale = ScaleFactor(1.5);
    assert_eq!(scale.scale(3), 5);
    assert_eq!(scale.scale(-3), -5);
    assert_eq!(scale.unscale(5), 3);
}
