//! GDAL-backed [`RasterEngine`].
//!
//! Each warp builds an in-memory VRT over the layer's files and reprojects it
//! into a Float32 MEM dataset with `GDALChunkAndWarpMulti`. Datasets are
//! closed when their handles drop, on success and error paths alike.

use std::path::Path;

use gdal::errors::GdalError;
use gdal::programs::raster::build_vrt;
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use tracing::{debug, trace};

use super::{
    ElevationRaster, GeoTiffOptions, Int16Raster, RasterEngine, RasterError, RasterInfo,
    ResampleFilter, WarpRequest,
};

const WARP_MEMORY_LIMIT: f64 = 512.0 * 1024.0 * 1024.0;

/// Raster engine using the system GDAL library.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalEngine;

impl GdalEngine {
    pub fn new() -> Self {
        Self
    }
}

fn resample_alg(filter: ResampleFilter) -> u32 {
    use gdal_sys::GDALResampleAlg::{GRA_Bilinear, GRA_Cubic, GRA_Lanczos, GRA_NearestNeighbour};
    match filter {
        ResampleFilter::Nearest => GRA_NearestNeighbour,
        ResampleFilter::Bilinear => GRA_Bilinear,
        ResampleFilter::Cubic => GRA_Cubic,
        ResampleFilter::Lanczos => GRA_Lanczos,
    }
}

fn open(path: &Path) -> Result<Dataset, RasterError> {
    Dataset::open(path).map_err(|e| RasterError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl RasterEngine for GdalEngine {
    fn describe(&self, path: &Path) -> Result<RasterInfo, RasterError> {
        let dataset = open(path)?;
        let open_err = |e: GdalError| RasterError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let geotransform = dataset.geo_transform().map_err(open_err)?;
        let (width, height) = dataset.raster_size();
        let geographic = dataset
            .spatial_ref()
            .map(|srs| srs.is_geographic())
            .unwrap_or(false);

        Ok(RasterInfo {
            geotransform: super::GeoTransform(geotransform),
            width,
            height,
            geographic,
        })
    }

    fn warp(&self, request: &WarpRequest<'_>) -> Result<ElevationRaster, RasterError> {
        let layer = request.layer;
        let (width, height) = (request.width, request.height);
        if layer.files.is_empty() {
            return Ok(ElevationRaster::empty(width, height));
        }

        let warp_err = |e: GdalError| RasterError::Warp {
            source_name: layer.source_name.clone(),
            reason: e.to_string(),
        };

        let sources = layer
            .files
            .iter()
            .map(|path| open(path))
            .collect::<Result<Vec<_>, _>>()?;
        let mut vrt = build_vrt(None, &sources, None).map_err(warp_err)?;
        if vrt.spatial_ref().is_err() {
            let srs = SpatialRef::from_epsg(layer.srs.epsg()).map_err(warp_err)?;
            vrt.set_spatial_ref(&srs).map_err(warp_err)?;
        }
        let src_nodata = vrt.rasterband(1).map_err(warp_err)?.no_data_value();

        let driver = DriverManager::get_driver_by_name("MEM").map_err(warp_err)?;
        let mut dst = driver
            .create_with_band_type::<f32, _>("", width, height, 1)
            .map_err(warp_err)?;
        let dst_srs = SpatialRef::from_epsg(request.dst_srs.epsg()).map_err(warp_err)?;
        dst.set_spatial_ref(&dst_srs).map_err(warp_err)?;
        dst.set_geo_transform(&request.geotransform.0)
            .map_err(warp_err)?;
        dst.rasterband(1)
            .map_err(warp_err)?
            .set_no_data_value(Some(f64::NAN))
            .map_err(warp_err)?;

        let w = i32::try_from(width).map_err(|_| RasterError::Warp {
            source_name: layer.source_name.clone(),
            reason: format!("width {width} too large"),
        })?;
        let h = i32::try_from(height).map_err(|_| RasterError::Warp {
            source_name: layer.source_name.clone(),
            reason: format!("height {height} too large"),
        })?;

        trace!(source = %layer.source_name, files = layer.files.len(), "Warping layer");

        // SAFETY: both dataset handles outlive the warp operation; every
        // GDAL-allocated object is destroyed before leaving the block.
        unsafe {
            use gdal_sys::{
                CPLErr, CPLGetLastErrorMsg, CPLMalloc, CSLSetNameValue, GDALChunkAndWarpMulti,
                GDALCreateGenImgProjTransformer2, GDALCreateWarpOperation, GDALCreateWarpOptions,
                GDALDestroyGenImgProjTransformer, GDALDestroyWarpOperation,
                GDALDestroyWarpOptions, GDALGenImgProjTransform,
            };

            let options = GDALCreateWarpOptions();
            (*options).hSrcDS = vrt.c_dataset();
            (*options).hDstDS = dst.c_dataset();
            (*options).papszWarpOptions = CSLSetNameValue(
                (*options).papszWarpOptions,
                c"INIT_DEST".as_ptr(),
                c"NO_DATA".as_ptr(),
            );

            (*options).nBandCount = 1;
            (*options).panSrcBands = CPLMalloc(std::mem::size_of::<i32>()).cast::<i32>();
            (*options).panDstBands = CPLMalloc(std::mem::size_of::<i32>()).cast::<i32>();
            (*options).panSrcBands.write(1);
            (*options).panDstBands.write(1);

            if let Some(nodata) = src_nodata {
                (*options).padfSrcNoDataReal =
                    CPLMalloc(std::mem::size_of::<f64>()).cast::<f64>();
                (*options).padfSrcNoDataReal.write(nodata);
            }
            (*options).padfDstNoDataReal = CPLMalloc(std::mem::size_of::<f64>()).cast::<f64>();
            (*options).padfDstNoDataReal.write(f64::NAN);

            (*options).eResampleAlg = resample_alg(layer.filter);
            (*options).dfWarpMemoryLimit = WARP_MEMORY_LIMIT;

            let transformer = GDALCreateGenImgProjTransformer2(
                vrt.c_dataset(),
                dst.c_dataset(),
                std::ptr::null_mut(),
            );
            if transformer.is_null() {
                GDALDestroyWarpOptions(options);
                return Err(RasterError::Warp {
                    source_name: layer.source_name.clone(),
                    reason: "failed to create transformer".to_string(),
                });
            }
            (*options).pTransformerArg = transformer;
            (*options).pfnTransformer = Some(GDALGenImgProjTransform);

            let operation = GDALCreateWarpOperation(options);
            let rv = GDALChunkAndWarpMulti(operation, 0, 0, w, h);

            GDALDestroyWarpOperation(operation);
            GDALDestroyGenImgProjTransformer(transformer);
            GDALDestroyWarpOptions(options);

            if rv != CPLErr::CE_None {
                let msg = std::ffi::CStr::from_ptr(CPLGetLastErrorMsg())
                    .to_string_lossy()
                    .into_owned();
                return Err(RasterError::Warp {
                    source_name: layer.source_name.clone(),
                    reason: msg,
                });
            }
        }

        let band = dst
            .rasterband(1)
            .map_err(warp_err)?
            .read_band_as::<f32>()
            .map_err(warp_err)?;

        Ok(ElevationRaster {
            width,
            height,
            data: band.data().to_vec(),
            nodata: src_nodata.map(|v| v as f32),
        })
    }

    fn write_geotiff_i16(
        &self,
        path: &Path,
        raster: &Int16Raster,
        options: &GeoTiffOptions,
    ) -> Result<(), RasterError> {
        let write_err = |e: GdalError| RasterError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut creation = RasterCreationOptions::new();
        for (key, value) in options.creation_options() {
            creation.set_name_value(&key, &value).map_err(write_err)?;
        }

        let driver = DriverManager::get_driver_by_name("GTiff").map_err(write_err)?;
        let mut dataset = driver
            .create_with_band_type_with_options::<i16, _>(
                path,
                raster.width,
                raster.height,
                1,
                &creation,
            )
            .map_err(write_err)?;
        let srs = SpatialRef::from_epsg(raster.srs.epsg()).map_err(write_err)?;
        dataset.set_spatial_ref(&srs).map_err(write_err)?;
        dataset
            .set_geo_transform(&raster.geotransform.0)
            .map_err(write_err)?;

        {
            let mut band = dataset.rasterband(1).map_err(write_err)?;
            band.set_no_data_value(Some(raster.nodata as f64))
                .map_err(write_err)?;
            let size = (raster.width, raster.height);
            let mut buffer = Buffer::new(size, raster.data.clone());
            band.write((0, 0), size, &mut buffer).map_err(write_err)?;
        }
        dataset.flush_cache().map_err(write_err)?;

        debug!(path = %path.display(), "Wrote GeoTIFF");
        Ok(())
    }
}
