use crate::error::ShapeError;
use crate::layers::{offset4, window_len, Module, Param};
use crate::math::tensor::Tensor;
use crate::network::spec::LayerKind;

/// 2-d convolution over `[N, C, H, W]` input with a square kernel.
#[derive(Debug)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    /// Shape `[out_channels, in_channels, kernel_size, kernel_size]`.
    pub weight: Param,
    pub bias: Option<Param>,
    cached_input: Option<Tensor>,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Conv2d {
        let fan_in = in_channels * kernel_size * kernel_size;
        let bound = 1.0 / (fan_in as f64).sqrt();
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            weight: Param::new(Tensor::uniform(
                &[out_channels, in_channels, kernel_size, kernel_size],
                bound,
            )),
            bias: bias.then(|| Param::new(Tensor::uniform(&[out_channels], bound))),
            cached_input: None,
        }
    }

    fn output_dims(&self, input: &Tensor) -> Result<(usize, usize), ShapeError> {
        input.require_rank("conv2d", 4)?;
        if input.shape[1] != self.in_channels {
            return Err(ShapeError::Mismatch {
                op: "conv2d",
                expected: vec![input.shape[0], self.in_channels, input.shape[2], input.shape[3]],
                actual: input.shape.clone(),
            });
        }
        let oh = window_len("conv2d", input.shape[2], self.kernel_size, self.stride, self.padding)?;
        let ow = window_len("conv2d", input.shape[3], self.kernel_size, self.stride, self.padding)?;
        Ok((oh, ow))
    }

    /// Maps an output position plus kernel offset back to an input
    /// coordinate, or `None` when it lands in the zero padding.
    #[inline]
    fn input_coord(&self, out: usize, k: usize, limit: usize) -> Option<usize> {
        let pos = (out * self.stride + k) as isize - self.padding as isize;
        (pos >= 0 && (pos as usize) < limit).then_some(pos as usize)
    }
}

impl Module for Conv2d {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2d
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError> {
        let (oh, ow) = self.output_dims(input)?;
        let (n, h, w) = (input.shape[0], input.shape[2], input.shape[3]);
        let k = self.kernel_size;
        let out_shape = [n, self.out_channels, oh, ow];
        let mut out = Tensor::zeros(&out_shape);

        for b in 0..n {
            for o in 0..self.out_channels {
                let bias = self.bias.as_ref().map(|p| p.value.data[o]).unwrap_or(0.0);
                for y in 0..oh {
                    for x in 0..ow {
                        let mut acc = bias;
                        for c in 0..self.in_channels {
                            for ky in 0..k {
                                let Some(iy) = self.input_coord(y, ky, h) else { continue };
                                for kx in 0..k {
                                    let Some(ix) = self.input_coord(x, kx, w) else { continue };
                                    acc += input.data[offset4(&input.shape, b, c, iy, ix)]
                                        * self.weight.value.data[offset4(&self.weight.value.shape, o, c, ky, kx)];
                                }
                            }
                        }
                        out.data[offset4(&out_shape, b, o, y, x)] = acc;
                    }
                }
            }
        }

        self.cached_input = Some(input.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError> {
        let input = self.cached_input.as_ref()
            .ok_or(ShapeError::NoForwardCache { op: "conv2d" })?;
        let (oh, ow) = self.output_dims(input)?;
        let (n, h, w) = (input.shape[0], input.shape[2], input.shape[3]);
        grad_output.require_shape("conv2d backward", &[n, self.out_channels, oh, ow])?;

        let k = self.kernel_size;
        let w_shape = self.weight.value.shape.clone();
        let mut dx = Tensor::zeros(&input.shape);

        for b in 0..n {
            for o in 0..self.out_channels {
                for y in 0..oh {
                    for x in 0..ow {
                        let g = grad_output.data[offset4(&grad_output.shape, b, o, y, x)];
                        if let Some(bias) = &mut self.bias {
                            bias.grad.data[o] += g;
                        }
                        if g == 0.0 {
                            continue;
                        }
                        for c in 0..self.in_channels {
                            for ky in 0..k {
                                let Some(iy) = self.input_coord(y, ky, h) else { continue };
                                for kx in 0..k {
                                    let Some(ix) = self.input_coord(x, kx, w) else { continue };
                                    let xi = offset4(&input.shape, b, c, iy, ix);
                                    let wi = offset4(&w_shape, o, c, ky, kx);
                                    self.weight.grad.data[wi] += g * input.data[xi];
                                    dx.data[xi] += g * self.weight.value.data[wi];
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(dx)
    }

    fn parameters(&self) -> Vec<(&'static str, &Param)> {
        let mut params = vec![("weight", &self.weight)];
        if let Some(bias) = &self.bias {
            params.push(("bias", bias));
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        let mut params = vec![("weight", &mut self.weight)];
        if let Some(bias) = &mut self.bias {
            params.push(("bias", bias));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones_kernel(in_c: usize, out_c: usize, k: usize, stride: usize, padding: usize) -> Conv2d {
        let mut conv = Conv2d::new(in_c, out_c, k, stride, padding, false);
        conv.weight.value.fill(1.0);
        conv
    }

    #[test]
    fn output_size_follows_stride_and_padding() {
        let mut conv = Conv2d::new(3, 8, 3, 2, 1, true);
        let y = conv.forward(&Tensor::zeros(&[2, 3, 7, 7])).unwrap();
        assert_eq!(y.shape, vec![2, 8, 4, 4]);
    }

    #[test]
    fn box_filter_sums_windows() {
        let mut conv = ones_kernel(1, 1, 2, 1, 0);
        let x = Tensor::from_vec(&[1, 1, 3, 3], (1..=9).map(f64::from).collect()).unwrap();
        let y = conv.forward(&x).unwrap();
        assert_eq!(y.shape, vec![1, 1, 2, 2]);
        assert_eq!(y.data, vec![12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn backward_routes_gradient_to_every_tap() {
        let mut conv = ones_kernel(1, 1, 2, 1, 0);
        let x = Tensor::from_vec(&[1, 1, 3, 3], vec![1.0; 9]).unwrap();
        conv.forward(&x).unwrap();
        let dx = conv.backward(&Tensor::from_vec(&[1, 1, 2, 2], vec![1.0; 4]).unwrap()).unwrap();
        // Centre pixel is covered by all four windows, corners by one.
        assert_eq!(dx.data, vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]);
        assert_eq!(conv.weight.grad.data, vec![4.0; 4]);
    }

    #[test]
    fn channel_mismatch_is_reported() {
        let mut conv = Conv2d::new(3, 4, 3, 1, 0, true);
        assert!(conv.forward(&Tensor::zeros(&[1, 1, 5, 5])).is_err());
    }

    #[test]
    fn kernel_larger_than_input_is_a_geometry_error() {
        let mut conv = Conv2d::new(1, 1, 5, 1, 0, true);
        assert!(matches!(
            conv.forward(&Tensor::zeros(&[1, 1, 3, 3])),
            Err(ShapeError::Geometry { .. })
        ));
    }
}
