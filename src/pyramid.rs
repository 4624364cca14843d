use crate::image::Image;

/// Downscaled copies of an image, each level half the size of its parent.
#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
}

impl Pyramid {
    pub fn empty() -> Self {
        Self { levels: vec![] }
    }

    /// Compute up to `level_count` levels. Stops early once a level would be
    /// smaller than 2 pixels along either axis.
    pub fn compute(&mut self, frame: &Image, level_count: usize) {
        self.levels.truncate(level_count);
        while self.levels.len() < level_count {
            self.levels.push(Image::empty())
        }
        let mut computed = 0;
        for i in 0..level_count {
            let (parent, rest) = if i == 0 {
                (frame, &mut self.levels[..])
            } else {
                // split_at_mut keeps the parent borrowed while writing the child
                let (done, rest) = self.levels.split_at_mut(i);
                (&done[i - 1], rest)
            };
            if parent.width < 4 || parent.height < 4 {
                break;
            }
            downscale(parent, &mut rest[0]);
            computed += 1;
        }
        self.levels.truncate(computed);
    }
}

/// The original image together with its pyramid
#[derive(Debug)]
pub struct PyramidFrame<'a> {
    pub image: &'a Image,
    pub pyramid: Pyramid,
}

impl<'a> PyramidFrame<'a> {
    pub fn new(image: &'a Image, level_count: usize) -> Self {
        let mut pyramid = Pyramid::empty();
        pyramid.compute(image, level_count);
        PyramidFrame { image, pyramid }
    }

    /// Number of levels including the original image
    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len() + 1
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }
}

/// downscale the parent image and store the result in child
fn downscale(parent: &Image, child: &mut Image) {
    let w = parent.width as i32;
    let h = parent.height as i32;

    let w_half = w / 2;
    let h_half = h / 2;
    child.data.clear();
    child.width = w_half as usize;
    child.height = h_half as usize;

    // clamp to the border
    let v = |x: i32, y: i32| -> u16 { parent.value_i32(x.clamp(0, w - 1), y.clamp(0, h - 1)) as u16 };

    for y in 0..h_half {
        let y2 = 2 * y;
        for x in 0..w_half {
            let x2 = 2 * x;
            // 3x3 binomial kernel
            let value = (4 * v(x2, y2)
                + 2 * (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1))
                + v(x2 + 1, y2 + 1)
                + v(x2 - 1, y2 - 1)
                + v(x2 - 1, y2 + 1)
                + v(x2 + 1, y2 - 1)
                + 8)
                / 16;
            child.data.push(value as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_image() {
        let image = Image::filled(40, 30, 77);
        let frame = PyramidFrame::new(&image, 3);
        assert_eq!(frame.level_count(), 4);
        assert_eq!(frame.get_image_at_level(1).width, 20);
        assert_eq!(frame.get_image_at_level(3).width, 5);
        assert_eq!(frame.get_image_at_level(3).height, 3);
        for level in 1..4 {
            assert!(frame.get_image_at_level(level).data.iter().all(|v| *v == 77));
        }
    }

    #[test]
    fn test_odd_and_small_images() {
        let image = Image::filled(9, 7, 1);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 5);
        // 9x7 -> 4x3, then stop
        assert_eq!(pyramid.levels.len(), 1);
        assert_eq!((pyramid.levels[0].width, pyramid.levels[0].height), (4, 3));
    }
}
