//! 前后对比视图
//!
//! 纯函数：由源图与当前显示图决定展示方式，两侧都有时使用滑块，
//! 缺一侧时退化为单图。

use crate::payload::{ImagePayload, ImageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonView<'a> {
    Slider {
        before: &'a ImageRef,
        after: &'a ImagePayload,
    },
    BeforeOnly(&'a ImageRef),
    AfterOnly(&'a ImagePayload),
    Empty,
}

impl<'a> ComparisonView<'a> {
    pub fn from_images(source: Option<&'a ImageRef>, current: Option<&'a ImagePayload>) -> Self {
        match (source, current) {
            (Some(before), Some(after)) => Self::Slider { before, after },
            (Some(before), None) => Self::BeforeOnly(before),
            (None, Some(after)) => Self::AfterOnly(after),
            (None, None) => Self::Empty,
        }
    }

    pub fn is_slider(&self) -> bool {
        matches!(self, Self::Slider { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 12] = [137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];

    #[test]
    fn picks_view_by_available_sides() {
        let source = ImageRef::Url("https://cdn.example.com/plan.png".to_string());
        let render = ImagePayload::new("image/png", PNG_SIGNATURE.to_vec()).expect("payload");

        let slider = ComparisonView::from_images(Some(&source), Some(&render));
        assert!(slider.is_slider());
        assert_eq!(ComparisonView::from_images(Some(&source), None), ComparisonView::BeforeOnly(&source));
        assert_eq!(ComparisonView::from_images(None, Some(&render)), ComparisonView::AfterOnly(&render));
        assert_eq!(ComparisonView::from_images(None, None), ComparisonView::Empty);
    }
}
