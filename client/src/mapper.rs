use shared::game_state::Dimensions;
use thiserror::Error;

/// size of the drawing surface every position is mapped onto.
pub const RENDER_WIDTH: f64 = 800.0;
pub const RENDER_HEIGHT: f64 = 480.0;

/// rows of the logical height taken up by the server's walls.
const PLAY_AREA_INSET: f64 = 3.0;
/// logical vertical positions start below the top wall.
const WALL_OFFSET: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("game field {width}x{height} cannot be mapped")]
    InvalidField { width: f64, height: f64 },
    #[error("paddle height {0} does not fit the game field")]
    InvalidPaddle(f64),
}

/// converts logical game-space into render-space. built once per received game config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    scale_x: f64,
    adjusted_scale_y: f64,
    paddle_height: f64,
    max_paddle_y: f64,
}

impl CoordinateMapper {
    pub fn new(field: &Dimensions) -> Result<Self, MappingError> {
        if field.width.is_nan()
            || field.width <= 0.0
            || field.height.is_nan()
            || field.height <= PLAY_AREA_INSET
        {
            return Err(MappingError::InvalidField {
                width: field.width,
                height: field.height,
            });
        }
        if field.paddle_height.is_nan()
            || field.paddle_height <= 0.0
            || field.paddle_height > field.height
        {
            return Err(MappingError::InvalidPaddle(field.paddle_height));
        }
        let scale_y = RENDER_HEIGHT / field.height;
        let paddle_height = field.paddle_height * scale_y;
        Ok(Self {
            scale_x: RENDER_WIDTH / field.width,
            adjusted_scale_y: RENDER_HEIGHT / (field.height - PLAY_AREA_INSET),
            paddle_height,
            max_paddle_y: RENDER_HEIGHT - paddle_height,
        })
    }

    pub fn paddle_height(&self) -> f64 {
        self.paddle_height
    }

    /// top edge of a paddle, kept fully on screen.
    pub fn paddle_y(&self, y: f64) -> f64 {
        ((y - WALL_OFFSET) * self.adjusted_scale_y).clamp(0.0, self.max_paddle_y)
    }

    pub fn ball(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale_x, (y - WALL_OFFSET) * self.adjusted_scale_y)
    }

    /// where paddles rest before the first snapshot.
    pub fn centred_paddle_y(&self) -> f64 {
        self.max_paddle_y / 2.0
    }
}

#[cfg(test)]
mod tests {
    use shared::game_state::Dimensions;

    use crate::mapper::{CoordinateMapper, MappingError, RENDER_HEIGHT};

    const EPSILON: f64 = 1e-9;

    fn field(width: f64, height: f64, paddle_height: f64) -> Dimensions {
        Dimensions {
            width,
            height,
            paddle_height,
        }
    }

    #[test]
    fn paddle_is_clamped_to_the_board() {
        let mapper = CoordinateMapper::new(&field(600.0, 360.0, 80.0)).unwrap();
        let scaled_paddle = 80.0 * RENDER_HEIGHT / 360.0;
        assert!((mapper.paddle_height() - scaled_paddle).abs() < EPSILON);
        assert_eq!(mapper.paddle_y(0.0), 0.0);
        assert!((mapper.paddle_y(360.0) - (RENDER_HEIGHT - scaled_paddle)).abs() < EPSILON);
        assert!((mapper.paddle_y(-50.0)).abs() < EPSILON);
        assert!((mapper.paddle_y(10_000.0) - (RENDER_HEIGHT - scaled_paddle)).abs() < EPSILON);
    }

    #[test]
    fn paddle_inside_the_board_is_scaled() {
        let mapper = CoordinateMapper::new(&field(600.0, 360.0, 80.0)).unwrap();
        // one row below the wall lands on the top edge.
        assert_eq!(mapper.paddle_y(1.0), 0.0);
        let expected = 100.0 * RENDER_HEIGHT / 357.0;
        assert!((mapper.paddle_y(101.0) - expected).abs() < EPSILON);
    }

    #[test]
    fn ball_is_scaled_per_axis() {
        let mapper = CoordinateMapper::new(&field(600.0, 360.0, 80.0)).unwrap();
        let (x, y) = mapper.ball(300.0, 179.5);
        assert!((x - 400.0).abs() < EPSILON);
        assert!((y - 178.5 * RENDER_HEIGHT / 357.0).abs() < EPSILON);
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = CoordinateMapper::new(&field(100.0, 60.0, 10.0)).unwrap();
        let b = CoordinateMapper::new(&field(100.0, 60.0, 10.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ball(33.0, 21.0), b.ball(33.0, 21.0));
    }

    #[test]
    fn unmappable_fields() {
        assert_eq!(
            CoordinateMapper::new(&field(0.0, 360.0, 80.0)),
            Err(MappingError::InvalidField {
                width: 0.0,
                height: 360.0
            })
        );
        assert!(CoordinateMapper::new(&field(600.0, 3.0, 1.0)).is_err());
        assert!(CoordinateMapper::new(&field(f64::NAN, 360.0, 80.0)).is_err());
        assert!(CoordinateMapper::new(&field(600.0, f64::NAN, 80.0)).is_err());
        assert!(CoordinateMapper::new(&field(600.0, 360.0, f64::NAN)).is_err());
        assert_eq!(
            CoordinateMapper::new(&field(600.0, 360.0, 400.0)),
            Err(MappingError::InvalidPaddle(400.0))
        );
        assert_eq!(
            CoordinateMapper::new(&field(600.0, 360.0, -1.0)),
            Err(MappingError::InvalidPaddle(-1.0))
        );
    }
}
