use crate::error::ShapeError;
use crate::layers::{offset4, window_len, Module};
use crate::math::tensor::Tensor;
use crate::network::spec::LayerKind;

/// Window geometry shared by both pooling layers.
#[derive(Debug, Clone, Copy)]
struct Window {
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl Window {
    fn output_shape(&self, op: &'static str, input: &Tensor) -> Result<[usize; 4], ShapeError> {
        input.require_rank(op, 4)?;
        let oh = window_len(op, input.shape[2], self.kernel, self.stride, self.padding)?;
        let ow = window_len(op, input.shape[3], self.kernel, self.stride, self.padding)?;
        Ok([input.shape[0], input.shape[1], oh, ow])
    }

    /// In-bounds input offsets covered by output cell `(b, c, y, x)`.
    fn taps(&self, shape: &[usize], b: usize, c: usize, y: usize, x: usize) -> Vec<usize> {
        let (h, w) = (shape[2] as isize, shape[3] as isize);
        let mut taps = Vec::with_capacity(self.kernel * self.kernel);
        for ky in 0..self.kernel {
            let iy = (y * self.stride + ky) as isize - self.padding as isize;
            if iy < 0 || iy >= h {
                continue;
            }
            for kx in 0..self.kernel {
                let ix = (x * self.stride + kx) as isize - self.padding as isize;
                if ix < 0 || ix >= w {
                    continue;
                }
                taps.push(offset4(shape, b, c, iy as usize, ix as usize));
            }
        }
        taps
    }
}

/// Max pooling; padded positions never win.
#[derive(Debug)]
pub struct MaxPool2d {
    window: Window,
    input_shape: Vec<usize>,
    // For every output element, the input offset that produced it.
    argmax: Option<Vec<usize>>,
}

impl MaxPool2d {
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> MaxPool2d {
        MaxPool2d {
            window: Window { kernel: kernel_size, stride, padding },
            input_shape: Vec::new(),
            argmax: None,
        }
    }
}

impl Module for MaxPool2d {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPool2d
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError> {
        let out_shape = self.window.output_shape("max_pool2d", input)?;
        let mut out = Tensor::zeros(&out_shape);
        let mut argmax = Vec::with_capacity(out.len());

        for b in 0..out_shape[0] {
            for c in 0..out_shape[1] {
                for y in 0..out_shape[2] {
                    for x in 0..out_shape[3] {
                        let taps = self.window.taps(&input.shape, b, c, y, x);
                        let best = taps.iter().copied()
                            .max_by(|&i, &j| {
                                input.data[i].partial_cmp(&input.data[j])
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .ok_or_else(|| ShapeError::Geometry {
                                op: "max_pool2d",
                                reason: "window covers only padding".into(),
                            })?;
                        out.data[offset4(&out_shape, b, c, y, x)] = input.data[best];
                        argmax.push(best);
                    }
                }
            }
        }

        self.input_shape = input.shape.clone();
        self.argmax = Some(argmax);
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError> {
        let argmax = self.argmax.as_ref()
            .ok_or(ShapeError::NoForwardCache { op: "max_pool2d" })?;
        if grad_output.len() != argmax.len() {
            return Err(ShapeError::Size { len: grad_output.len(), shape: grad_output.shape.clone() });
        }
        let mut dx = Tensor::zeros(&self.input_shape);
        for (&src, &g) in argmax.iter().zip(&grad_output.data) {
            dx.data[src] += g;
        }
        Ok(dx)
    }
}

/// Average pooling; the divisor is always `kernel_size²` (padding counts).
#[derive(Debug)]
pub struct AvgPool2d {
    window: Window,
    input_shape: Option<Vec<usize>>,
}

impl AvgPool2d {
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> AvgPool2d {
        AvgPool2d {
            window: Window { kernel: kernel_size, stride, padding },
            input_shape: None,
        }
    }

    fn divisor(&self) -> f64 {
        (self.window.kernel * self.window.kernel) as f64
    }
}

impl Module for AvgPool2d {
    fn kind(&self) -> LayerKind {
        LayerKind::AvgPool2d
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError> {
        let out_shape = self.window.output_shape("avg_pool2d", input)?;
        let mut out = Tensor::zeros(&out_shape);
        let div = self.divisor();

        for b in 0..out_shape[0] {
            for c in 0..out_shape[1] {
                for y in 0..out_shape[2] {
                    for x in 0..out_shape[3] {
                        let sum: f64 = self.window.taps(&input.shape, b, c, y, x)
                            .into_iter()
                            .map(|i| input.data[i])
                            .sum();
                        out.data[offset4(&out_shape, b, c, y, x)] = sum / div;
                    }
                }
            }
        }

        self.input_shape = Some(input.shape.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError> {
        let input_shape = self.input_shape.clone()
            .ok_or(ShapeError::NoForwardCache { op: "avg_pool2d" })?;
        let blank = Tensor::zeros(&input_shape);
        let out_shape = self.window.output_shape("avg_pool2d", &blank)?;
        grad_output.require_shape("avg_pool2d backward", &out_shape)?;

        let div = self.divisor();
        let mut dx = blank;
        for b in 0..out_shape[0] {
            for c in 0..out_shape[1] {
                for y in 0..out_shape[2] {
                    for x in 0..out_shape[3] {
                        let g = grad_output.data[offset4(&out_shape, b, c, y, x)] / div;
                        for i in self.window.taps(&input_shape, b, c, y, x) {
                            dx.data[i] += g;
                        }
                    }
                }
            }
        }
        Ok(dx)
    }
}
